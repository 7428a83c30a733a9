use anyhow::Result;
use std::sync::Arc;
use tracing::*;

use crate::allocator::{AllocationError, IdAllocator};
use kernel::prelude::*;

pub const UID_NUMBER: &str = "uidNumber";
pub const GID_NUMBER: &str = "gidNumber";
pub const POSIX_ACCOUNT: &str = "posixAccount";

/// What happened to one added entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    Denied,
    NotPosix,
    Present,
    Exhausted,
    Unresolved,
    Uid(u64),
    UidAndGid(u64),
}

/// Fills in `uidNumber` and `gidNumber` on added `posixAccount` entries
/// that lack them. Never rejects or completes an add itself.
pub struct AutoPosixIds {
    allocator: Arc<IdAllocator>,
    schema: Arc<Schema>,
    access: Arc<dyn AccessControl>,
    posix_account: Arc<ObjectClass>,
}

impl AutoPosixIds {
    pub fn new(
        allocator: Arc<IdAllocator>,
        attachment: &Attachment,
        posix_account: Arc<ObjectClass>,
    ) -> Self {
        Self {
            allocator,
            schema: Arc::clone(&attachment.schema),
            access: Arc::clone(&attachment.access),
            posix_account,
        }
    }

    fn is_present(&self, entry: &Entry, name: &str) -> bool {
        match self.schema.resolve(name) {
            Ok(desc) => entry.has(&desc),
            Err(_) => entry.attribute(name).is_some(),
        }
    }

    fn resolve(&self, name: &str) -> Option<AttributeDescription> {
        match self.schema.resolve(name) {
            Ok(desc) => Some(desc),
            Err(e) => {
                warn!("failed to add {}: {}", name, e);
                None
            }
        }
    }

    pub fn assign(
        &self,
        principal: &Principal,
        entry: &mut Entry,
        searcher: &dyn EntrySearcher,
    ) -> Assignment {
        if !self.access.can_write(principal, entry) {
            return Assignment::Denied;
        }

        if !entry.has_object_class(&self.posix_account) {
            trace!(dn = %entry.dn(), "not {}", POSIX_ACCOUNT);
            return Assignment::NotPosix;
        }

        // gidNumber is left alone as well, even when it's missing.
        if self.is_present(entry, UID_NUMBER) {
            trace!(dn = %entry.dn(), "ignoring, {} present", UID_NUMBER);
            return Assignment::Present;
        }

        let id = match self.allocator.next(searcher) {
            Ok(id) => id,
            Err(AllocationError::Exhausted) => {
                error!(dn = %entry.dn(), "{} exhausted", UID_NUMBER);
                return Assignment::Exhausted;
            }
        };

        let Some(uid) = self.resolve(UID_NUMBER) else {
            return Assignment::Unresolved;
        };

        let value = id.to_string();
        entry.merge_one(&uid, value.clone());

        info!(dn = %entry.dn(), uid = id, "added {}", uid);

        if self.is_present(entry, GID_NUMBER) {
            trace!(dn = %entry.dn(), "ignoring, {} present", GID_NUMBER);
            return Assignment::Uid(id);
        }

        let Some(gid) = self.resolve(GID_NUMBER) else {
            return Assignment::Uid(id);
        };

        entry.merge_one(&gid, value);

        info!(dn = %entry.dn(), gid = id, "added {}", gid);

        Assignment::UidAndGid(id)
    }
}

impl Middleware for AutoPosixIds {
    fn handle(&self, value: Operation, next: MiddlewareNext) -> Result<Effect> {
        match value {
            Operation::Add(mut add) => {
                let assignment = self.assign(&add.principal, &mut add.entry, next.searcher());

                debug!(dn = %add.entry.dn(), ?assignment, "add");

                next.handle(Operation::Add(add))
            }
            _ => next.handle(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::RefCell;

    /// A store holding fixed entries that counts scans.
    struct Stored {
        entries: Vec<Entry>,
        scans: RefCell<usize>,
    }

    impl Stored {
        fn new(entries: Vec<Entry>) -> Self {
            Self {
                entries,
                scans: RefCell::new(0),
            }
        }
    }

    impl EntrySearcher for Stored {
        fn search(
            &self,
            request: &SearchRequest,
            visit: &mut dyn FnMut(&Entry) -> Result<()>,
        ) -> Result<()> {
            *self.scans.borrow_mut() += 1;
            for entry in self.entries.iter().filter(|e| request.selects(e)) {
                visit(&request.project(entry))?;
            }
            Ok(())
        }
    }

    struct Deny {}

    impl AccessControl for Deny {
        fn can_write(&self, _principal: &Principal, _entry: &Entry) -> bool {
            false
        }
    }

    fn interceptor_for(schema: Schema, access: Arc<dyn AccessControl>) -> Result<AutoPosixIds> {
        let attachment = Attachment::new(Arc::new(schema), access);
        let posix_account = attachment
            .schema
            .find_object_class(POSIX_ACCOUNT)
            .ok_or_else(|| anyhow!("posixAccount"))?;
        let allocator = Arc::new(IdAllocator::new(Schema::rfc2307().resolve(UID_NUMBER)?));

        Ok(AutoPosixIds::new(allocator, &attachment, posix_account))
    }

    fn interceptor() -> Result<AutoPosixIds> {
        interceptor_for(Schema::rfc2307(), Arc::new(AllowAll::default()))
    }

    fn account(uid: &str) -> EntryBuilder {
        build_entry(&format!("uid={},ou=people,dc=example", uid))
            .posix_account()
            .attr("cn", uid)
            .attr("uid", uid)
            .attr("homeDirectory", &format!("/home/{}", uid))
    }

    fn add(entry: Entry) -> Operation {
        Operation::Add(AddRequest::new(Principal::Root, entry))
    }

    fn added(interceptor: AutoPosixIds, store: &Stored, entry: Entry) -> Result<Entry> {
        let all: Vec<Arc<dyn Middleware>> = vec![Arc::new(interceptor)];
        match apply_middleware(&all, store, add(entry), |op| match op {
            Operation::Add(add) => Ok(Effect::Added(add.entry)),
            _ => Err(anyhow!("Unexpected operation")),
        })? {
            Effect::Added(entry) => Ok(entry),
            _ => Err(anyhow!("Unexpected effect")),
        }
    }

    #[test]
    fn it_assigns_matching_identifiers_in_an_empty_store() -> Result<()> {
        let store = Stored::new(vec![]);

        let entry = added(interceptor()?, &store, account("jacob").into())?;

        assert_eq!(entry.values("uidNumber"), &["1"]);
        assert_eq!(entry.values("gidNumber"), &["1"]);

        Ok(())
    }

    #[test]
    fn it_continues_after_existing_identifiers() -> Result<()> {
        let store = Stored::new(vec![account("carla").attr("uidNumber", "41").into()]);

        let entry = added(interceptor()?, &store, account("jacob").into())?;

        assert_eq!(entry.values("uidNumber"), &["42"]);
        assert_eq!(entry.values("gidNumber"), &["42"]);

        Ok(())
    }

    #[test]
    fn it_leaves_entries_with_uid_alone() -> Result<()> {
        let store = Stored::new(vec![]);
        let interceptor = interceptor()?;
        let mut entry: Entry = account("jacob").attr("UIDNUMBER", "500").into();
        let before = entry.clone();

        let assignment = interceptor.assign(&Principal::Root, &mut entry, &store);

        assert_eq!(assignment, Assignment::Present);
        assert_eq!(entry, before);
        assert!(entry.values("gidNumber").is_empty());
        assert_eq!(*store.scans.borrow(), 0);
        assert_eq!(interceptor.allocator.high_water_mark(), 0);

        Ok(())
    }

    #[test]
    fn it_keeps_an_existing_gid() -> Result<()> {
        let store = Stored::new(vec![]);
        let mut entry: Entry = account("jacob").attr("gidNumber", "100").into();

        let assignment = interceptor()?.assign(&Principal::Root, &mut entry, &store);

        assert_eq!(assignment, Assignment::Uid(1));
        assert_eq!(entry.values("uidNumber"), &["1"]);
        assert_eq!(entry.values("gidNumber"), &["100"]);

        Ok(())
    }

    #[test]
    fn it_ignores_entries_that_are_not_posix_accounts() -> Result<()> {
        let store = Stored::new(vec![]);
        let mut entry: Entry = build_entry("ou=people,dc=example")
            .class("organizationalUnit")
            .attr("ou", "people")
            .into();

        let assignment = interceptor()?.assign(&Principal::Root, &mut entry, &store);

        assert_eq!(assignment, Assignment::NotPosix);
        assert!(entry.values("uidNumber").is_empty());
        assert_eq!(*store.scans.borrow(), 0);

        Ok(())
    }

    #[test]
    fn it_recognizes_posix_accounts_ignoring_case() -> Result<()> {
        let store = Stored::new(vec![]);
        let mut entry: Entry = build_entry("uid=jacob,dc=example").class("POSIXACCOUNT").into();

        let assignment = interceptor()?.assign(&Principal::Root, &mut entry, &store);

        assert_eq!(assignment, Assignment::UidAndGid(1));

        Ok(())
    }

    #[test]
    fn it_assigns_nothing_without_write_access() -> Result<()> {
        let store = Stored::new(vec![]);
        let interceptor = interceptor_for(Schema::rfc2307(), Arc::new(Deny {}))?;
        let mut entry: Entry = account("jacob").into();

        let assignment = interceptor.assign(&Principal::Anonymous, &mut entry, &store);

        assert_eq!(assignment, Assignment::Denied);
        assert!(entry.values("uidNumber").is_empty());
        assert_eq!(*store.scans.borrow(), 0);

        Ok(())
    }

    #[test]
    fn it_skips_gid_when_the_schema_lacks_it() -> Result<()> {
        let store = Stored::new(vec![]);
        let schema = Schema::rfc2307().without_attribute(GID_NUMBER);
        let interceptor = interceptor_for(schema, Arc::new(AllowAll::default()))?;
        let mut entry: Entry = account("jacob").into();

        let assignment = interceptor.assign(&Principal::Root, &mut entry, &store);

        assert_eq!(assignment, Assignment::Uid(1));
        assert_eq!(entry.values("uidNumber"), &["1"]);
        assert!(entry.values("gidNumber").is_empty());

        Ok(())
    }

    #[test]
    fn it_skips_both_when_the_schema_lacks_uid() -> Result<()> {
        let store = Stored::new(vec![]);
        let schema = Schema::rfc2307().without_attribute(UID_NUMBER);
        let interceptor = interceptor_for(schema, Arc::new(AllowAll::default()))?;
        let mut entry: Entry = account("jacob").into();

        let assignment = interceptor.assign(&Principal::Root, &mut entry, &store);

        assert_eq!(assignment, Assignment::Unresolved);
        assert!(entry.values("uidNumber").is_empty());
        assert!(entry.values("gidNumber").is_empty());

        Ok(())
    }

    #[test]
    fn it_passes_exhaustion_through_without_assigning() -> Result<()> {
        let store = Stored::new(vec![account("carla")
            .attr("uidNumber", "18446744073709551615")
            .into()]);

        let entry = added(interceptor()?, &store, account("jacob").into())?;

        assert!(entry.values("uidNumber").is_empty());
        assert!(entry.values("gidNumber").is_empty());

        Ok(())
    }

    #[test]
    fn it_passes_other_operations_through() -> Result<()> {
        let store = Stored::new(vec![]);
        let all: Vec<Arc<dyn Middleware>> = vec![Arc::new(interceptor()?)];
        let search = Operation::Search(SearchRequest::everywhere(Filter::present("uid")));

        let effect = apply_middleware(&all, &store, search, |op| match op {
            Operation::Search(_) => Ok(Effect::Entries(vec![])),
            _ => Err(anyhow!("Unexpected operation")),
        })?;

        assert!(matches!(effect, Effect::Entries(_)));
        assert_eq!(*store.scans.borrow(), 0);

        Ok(())
    }
}
