//! In-memory membership system for testing.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{ChannelAccess, GuildMember, Membership, MembershipError, Role, RoleSpec};

#[derive(Default)]
struct MockState {
    roles: Vec<Role>,
    /// Specs passed to `create_role`
    specs: Vec<RoleSpec>,
    members: BTreeMap<String, GuildMember>,
    next_role: u64,
    /// Role names whose grants/revocations fail
    failing_roles: HashSet<String>,
    /// Number of upcoming mutations answered with 429
    rate_limited: u32,
    /// Delay those 429s ask for
    retry_after_ms: u64,
    overwrites: Vec<(String, String, ChannelAccess)>,
}

impl MockState {
    fn role_named(&self, name: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.name == name)
    }

    fn push_role(&mut self, name: &str) -> Role {
        self.next_role += 1;
        let role = Role {
            id: format!("role-{}", self.next_role),
            name: name.to_string(),
        };
        self.roles.push(role.clone());
        role
    }

    fn ensure_role(&mut self, name: &str) -> String {
        match self.role_named(name) {
            Some(role) => role.id.clone(),
            None => self.push_role(name).id,
        }
    }

    /// Shared preconditions of add/remove.
    fn check_mutation(&mut self, member_id: &str, role_id: &str) -> Result<(), MembershipError> {
        if self.rate_limited > 0 {
            self.rate_limited -= 1;
            return Err(MembershipError::RateLimited {
                retry_after_ms: self.retry_after_ms,
            });
        }
        let role = self
            .roles
            .iter()
            .find(|r| r.id == role_id)
            .ok_or_else(|| MembershipError::NotFound(format!("role {}", role_id)))?;
        if self.failing_roles.contains(&role.name) {
            return Err(MembershipError::Api {
                status: 500,
                body: format!("injected failure for {}", role.name),
            });
        }
        if !self.members.contains_key(member_id) {
            return Err(MembershipError::NotFound(format!("member {}", member_id)));
        }
        Ok(())
    }
}

/// In-memory community with call accounting and failure injection.
#[derive(Default)]
pub struct MockMembership {
    state: Mutex<MockState>,
    mutations: AtomicU32,
}

impl MockMembership {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Define roles by name.
    pub fn with_roles(self, names: &[&str]) -> Self {
        {
            let mut state = self.state();
            for name in names {
                state.ensure_role(name);
            }
        }
        self
    }

    /// Add a member holding the named roles (created if missing).
    pub fn with_member(self, id: &str, username: &str, role_names: &[&str]) -> Self {
        {
            let mut state = self.state();
            let roles = role_names.iter().map(|name| state.ensure_role(name)).collect();
            state.members.insert(
                id.to_string(),
                GuildMember {
                    id: id.to_string(),
                    username: username.to_string(),
                    roles,
                },
            );
        }
        self
    }

    /// Make every grant/revocation of this role fail.
    pub fn fail_role(&self, name: &str) {
        self.state().failing_roles.insert(name.to_string());
    }

    /// Answer the next `count` mutations with a rate-limit error.
    pub fn rate_limit_next(&self, count: u32) {
        self.rate_limit_next_for(count, 250);
    }

    /// Like `rate_limit_next`, asking for a wait of `retry_after_ms`.
    pub fn rate_limit_next_for(&self, count: u32, retry_after_ms: u64) {
        let mut state = self.state();
        state.rate_limited = count;
        state.retry_after_ms = retry_after_ms;
    }

    /// Add/remove calls attempted so far.
    pub fn mutation_count(&self) -> u32 {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn reset_mutation_count(&self) {
        self.mutations.store(0, Ordering::SeqCst);
    }

    /// Names of the roles a member currently holds, sorted.
    pub fn member_role_names(&self, member_id: &str) -> Vec<String> {
        let state = self.state();
        let mut names: Vec<String> = state
            .members
            .get(member_id)
            .map(|m| {
                m.roles
                    .iter()
                    .filter_map(|id| state.roles.iter().find(|r| &r.id == id))
                    .map(|r| r.name.clone())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Specs passed to `create_role`, in call order.
    pub fn created_specs(&self) -> Vec<RoleSpec> {
        self.state().specs.clone()
    }

    pub fn role_id(&self, name: &str) -> Option<String> {
        self.state().role_named(name).map(|r| r.id.clone())
    }

    /// Channel overwrites set so far as (channel, role id, access).
    pub fn overwrites(&self) -> Vec<(String, String, ChannelAccess)> {
        self.state().overwrites.clone()
    }
}

#[async_trait]
impl Membership for MockMembership {
    async fn roles(&self, _community_id: &str) -> Result<Vec<Role>, MembershipError> {
        Ok(self.state().roles.clone())
    }

    async fn create_role(
        &self,
        _community_id: &str,
        spec: &RoleSpec,
    ) -> Result<Role, MembershipError> {
        let mut state = self.state();
        state.specs.push(spec.clone());
        Ok(state.push_role(&spec.name))
    }

    async fn add_member_role(
        &self,
        _community_id: &str,
        member_id: &str,
        role_id: &str,
    ) -> Result<(), MembershipError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        state.check_mutation(member_id, role_id)?;
        if let Some(member) = state.members.get_mut(member_id) {
            if !member.has_role(role_id) {
                member.roles.push(role_id.to_string());
            }
        }
        Ok(())
    }

    async fn remove_member_role(
        &self,
        _community_id: &str,
        member_id: &str,
        role_id: &str,
    ) -> Result<(), MembershipError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        state.check_mutation(member_id, role_id)?;
        if let Some(member) = state.members.get_mut(member_id) {
            member.roles.retain(|r| r != role_id);
        }
        Ok(())
    }

    async fn member(
        &self,
        _community_id: &str,
        member_id: &str,
    ) -> Result<GuildMember, MembershipError> {
        self.state()
            .members
            .get(member_id)
            .cloned()
            .ok_or_else(|| MembershipError::NotFound(format!("member {}", member_id)))
    }

    async fn members(&self, _community_id: &str) -> Result<Vec<GuildMember>, MembershipError> {
        Ok(self.state().members.values().cloned().collect())
    }

    async fn set_channel_access(
        &self,
        channel_id: &str,
        role_id: &str,
        access: ChannelAccess,
    ) -> Result<(), MembershipError> {
        self.state()
            .overwrites
            .push((channel_id.to_string(), role_id.to_string(), access));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_grants_and_counts() {
        let mock = MockMembership::new()
            .with_roles(&["10 Stars"])
            .with_member("u1", "alice", &[]);
        let role_id = mock.role_id("10 Stars").unwrap();

        mock.add_member_role("g", "u1", &role_id).await.unwrap();
        assert_eq!(mock.member_role_names("u1"), vec!["10 Stars".to_string()]);
        assert_eq!(mock.mutation_count(), 1);

        mock.rate_limit_next(1);
        let limited = mock.remove_member_role("g", "u1", &role_id).await;
        assert!(matches!(limited, Err(MembershipError::RateLimited { .. })));
        assert_eq!(mock.member_role_names("u1"), vec!["10 Stars".to_string()]);
    }
}
