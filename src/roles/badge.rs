//! Badges: the community roles this crate manages.

use std::fmt;

use crate::membership::RoleSpec;
use crate::scoreboard::ScoreboardMember;

/// Star counts that earn a threshold badge, ascending.
pub const STAR_THRESHOLDS: [u32; 5] = [10, 20, 30, 40, 50];

/// Days of the event calendar.
pub const EVENT_DAYS: std::ops::RangeInclusive<u32> = 1..=25;

const CONNECTED: &str = "Connected";
const SPOILER: &str = "Spoiler";

/// A named community role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Badge {
    /// Earned at `stars >= threshold`
    Stars(u32),
    /// Held by every claimed member
    Connected,
    /// Day N of the calendar completed
    Day(u32),
    /// Opt-in, never derived from the leaderboard
    Spoiler,
}

impl Badge {
    /// Role name in the community.
    pub fn name(&self) -> String {
        match self {
            Self::Stars(threshold) => format!("{} Stars", threshold),
            Self::Connected => CONNECTED.to_string(),
            Self::Day(day) => format!("Day {:02}", day),
            Self::Spoiler => SPOILER.to_string(),
        }
    }

    /// Parse a role name. Only canonical names are recognised, so
    /// `from_name(b.name()) == Some(b)` and nothing else maps to a badge.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            CONNECTED => return Some(Self::Connected),
            SPOILER => return Some(Self::Spoiler),
            _ => {}
        }

        if let Some(count) = name.strip_suffix(" Stars") {
            let threshold: u32 = count.parse().ok()?;
            return (STAR_THRESHOLDS.contains(&threshold) && count == threshold.to_string())
                .then_some(Self::Stars(threshold));
        }

        if let Some(day) = name.strip_prefix("Day ") {
            let n: u32 = day.parse().ok()?;
            return (EVENT_DAYS.contains(&n) && day == format!("{:02}", n)).then_some(Self::Day(n));
        }

        None
    }

    /// Whether reconciliation may add or remove this badge.
    pub fn is_managed(&self) -> bool {
        match self {
            Self::Stars(threshold) => STAR_THRESHOLDS.contains(threshold),
            Self::Connected => true,
            Self::Day(day) => EVENT_DAYS.contains(day),
            Self::Spoiler => false,
        }
    }

    /// Attributes used when the role has to be created.
    pub fn role_spec(&self) -> RoleSpec {
        let spec = RoleSpec::new(self.name());
        match self {
            Self::Stars(50) => spec.with_color(0xF1C40F).hoisted().mentionable(),
            Self::Stars(40) => spec.with_color(0xE91E63).hoisted().mentionable(),
            Self::Stars(30) => spec.with_color(0x9B59B6).hoisted().mentionable(),
            Self::Stars(20) => spec.with_color(0x3498DB).hoisted().mentionable(),
            Self::Stars(10) => spec.with_color(0x2ECC71).hoisted().mentionable(),
            Self::Stars(_) => spec,
            Self::Connected => spec.with_color(0x1ABC9C).hoisted().mentionable(),
            Self::Day(_) => spec,
            Self::Spoiler => spec.mentionable(),
        }
    }
}

impl fmt::Display for Badge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Every badge reconciliation may touch.
pub fn managed_universe() -> Vec<Badge> {
    STAR_THRESHOLDS
        .iter()
        .map(|&t| Badge::Stars(t))
        .chain(std::iter::once(Badge::Connected))
        .chain(EVENT_DAYS.map(Badge::Day))
        .collect()
}

/// Badges a claimed leaderboard member should hold.
///
/// Pure: depends only on the member and the daily-roles flag.
pub fn desired_badges(member: &ScoreboardMember, daily_roles: bool) -> Vec<Badge> {
    let mut badges: Vec<Badge> = STAR_THRESHOLDS
        .iter()
        .filter(|&&threshold| member.stars >= threshold)
        .map(|&threshold| Badge::Stars(threshold))
        .collect();

    badges.push(Badge::Connected);

    if daily_roles {
        badges.extend(EVENT_DAYS.filter(|&day| member.completed_day(day)).map(Badge::Day));
    }

    badges
}

/// Roles a community needs, in creation order.
///
/// Created top-down so the highest threshold sits above the lower ones in
/// the role list.
pub fn required_roles(daily_roles: bool) -> Vec<Badge> {
    let mut badges = vec![Badge::Spoiler];
    badges.extend(STAR_THRESHOLDS.iter().rev().map(|&t| Badge::Stars(t)));
    badges.push(Badge::Connected);
    if daily_roles {
        badges.extend(EVENT_DAYS.rev().map(Badge::Day));
    }
    badges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for badge in managed_universe().into_iter().chain([Badge::Spoiler]) {
            assert_eq!(Badge::from_name(&badge.name()), Some(badge));
        }
        assert_eq!(Badge::Day(3).name(), "Day 03");
        assert_eq!(Badge::Stars(40).name(), "40 Stars");
    }

    #[test]
    fn test_non_canonical_names_rejected() {
        for name in ["Day 3", "Day 26", "Day 00", "15 Stars", "010 Stars", "connected", "Moderator"] {
            assert_eq!(Badge::from_name(name), None, "{}", name);
        }
    }

    #[test]
    fn test_spoiler_is_not_managed() {
        assert!(!Badge::Spoiler.is_managed());
        assert!(!managed_universe().contains(&Badge::Spoiler));
        assert_eq!(managed_universe().len(), 31);
    }

    #[test]
    fn test_thirty_five_stars_without_daily_roles() {
        let member = ScoreboardMember::new(1, "alice")
            .with_stars(35)
            .with_completed_days(&[1, 2, 3]);

        assert_eq!(
            desired_badges(&member, false),
            vec![Badge::Stars(10), Badge::Stars(20), Badge::Stars(30), Badge::Connected]
        );
    }

    #[test]
    fn test_daily_roles_follow_completion() {
        let member = ScoreboardMember::new(1, "alice")
            .with_stars(4)
            .with_completed_days(&[1, 7]);

        assert_eq!(
            desired_badges(&member, true),
            vec![Badge::Connected, Badge::Day(1), Badge::Day(7)]
        );
    }

    #[test]
    fn test_thresholds_are_monotonic() {
        let mut previous: Vec<Badge> = Vec::new();
        for stars in 0..=50 {
            let member = ScoreboardMember::new(1, "alice").with_stars(stars);
            let badges = desired_badges(&member, false);
            assert!(previous.iter().all(|b| badges.contains(b)), "lost a badge at {}", stars);
            previous = badges;
        }
        assert_eq!(previous.len(), 6);
    }

    #[test]
    fn test_role_specs() {
        let gold = Badge::Stars(50).role_spec();
        assert_eq!(gold.color, Some(0xF1C40F));
        assert!(gold.hoist && gold.mentionable);

        let spoiler = Badge::Spoiler.role_spec();
        assert_eq!(spoiler.color, None);
        assert!(spoiler.mentionable && !spoiler.hoist);

        assert_eq!(required_roles(false).len(), 7);
        assert_eq!(required_roles(true).len(), 32);
        assert_eq!(required_roles(true)[7], Badge::Day(25));
    }
}
