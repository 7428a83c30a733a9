use anyhow::Result;
use itertools::Itertools;
use std::sync::Arc;

use crate::*;
use engine::{storage::memory, Directory, SessionOpener, StorageFactory};

#[ctor::ctor]
fn initialize_tests() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .init();
}

fn overlays() -> RegisteredOverlays {
    let mut overlays = RegisteredOverlays::default();
    overlays.register(AutoPosixIdsFactory::default());
    overlays
}

fn attach(storage_factory: Arc<dyn StorageFactory>, schema: Schema) -> Result<Directory> {
    Directory::attach(
        storage_factory,
        Arc::new(schema),
        Arc::new(AllowAll::default()),
        &overlays(),
    )
}

fn directory() -> Result<Directory> {
    attach(memory::Factory::new(), Schema::rfc2307())
}

fn account(uid: &str) -> EntryBuilder {
    build_entry(&format!("uid={},ou=people,dc=example", uid))
        .posix_account()
        .attr("cn", uid)
        .attr("uid", uid)
        .attr("homeDirectory", &format!("/home/{}", uid))
}

fn identifiers(entry: &Entry) -> (String, String) {
    (
        entry.values(UID_NUMBER).join(","),
        entry.values(GID_NUMBER).join(","),
    )
}

#[test]
fn it_registers_under_its_key() -> Result<()> {
    assert_eq!(directory()?.overlay_keys()?, vec!["autoPosixIds"]);

    Ok(())
}

#[test]
fn it_assigns_one_to_the_first_account() -> Result<()> {
    let session = directory()?.open_session()?;

    let added = session.add(Principal::Root, account("jacob").into())?;

    insta::assert_json_snapshot!(added, @r###"
    {
      "dn": "uid=jacob,ou=people,dc=example",
      "attributes": [
        {
          "name": "objectClass",
          "values": [
            "top",
            "account",
            "posixAccount"
          ]
        },
        {
          "name": "cn",
          "values": [
            "jacob"
          ]
        },
        {
          "name": "uid",
          "values": [
            "jacob"
          ]
        },
        {
          "name": "homeDirectory",
          "values": [
            "/home/jacob"
          ]
        },
        {
          "name": "uidNumber",
          "values": [
            "1"
          ]
        },
        {
          "name": "gidNumber",
          "values": [
            "1"
          ]
        }
      ]
    }
    "###);

    Ok(())
}

#[test]
fn it_continues_after_identifiers_already_stored() -> Result<()> {
    let storage_factory = memory::Factory::new();
    storage_factory
        .create_storage()?
        .add(&account("carla").attr("uidNumber", "41").attr("gidNumber", "41").into())?;

    let directory = attach(storage_factory, Schema::rfc2307())?;
    let added = directory.open_session()?.add(Principal::Root, account("jacob").into())?;

    assert_eq!(identifiers(&added), ("42".to_owned(), "42".to_owned()));

    Ok(())
}

#[test]
fn it_keeps_counting_across_sessions() -> Result<()> {
    let directory = directory()?;

    let first = directory.open_session()?.add(Principal::Root, account("jacob").into())?;
    let second = directory.open_session()?.add(Principal::Root, account("carla").into())?;

    assert_eq!(identifiers(&first), ("1".to_owned(), "1".to_owned()));
    assert_eq!(identifiers(&second), ("2".to_owned(), "2".to_owned()));

    Ok(())
}

fn assert_distinct_concurrent_adds(directory: Directory) -> Result<()> {
    std::thread::scope(|s| {
        let handles = (0..10)
            .map(|i| {
                let directory = directory.clone();
                s.spawn(move || -> Result<Entry> {
                    let session = directory.open_session()?;
                    session.add(Principal::Root, account(&format!("user{}", i)).into())
                })
            })
            .collect::<Vec<_>>();

        handles
            .into_iter()
            .map(|h| h.join().expect("adding thread panicked"))
            .collect::<Result<Vec<_>>>()
    })?;

    let stored = directory.query_all()?;
    let pairs = stored.iter().map(identifiers).collect::<Vec<_>>();

    assert!(pairs.iter().all(|(uid, gid)| uid == gid));

    let uids = pairs
        .iter()
        .map(|(uid, _)| uid.parse::<u64>())
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .sorted()
        .collect::<Vec<_>>();

    assert_eq!(uids, (1..=10).collect::<Vec<u64>>());

    Ok(())
}

#[test]
fn it_assigns_distinct_identifiers_to_concurrent_adds() -> Result<()> {
    assert_distinct_concurrent_adds(directory()?)
}

#[test]
fn it_assigns_distinct_identifiers_to_concurrent_adds_on_sqlite() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("directory.sqlite3");
    let storage_factory = sqlite::Factory::new(&path.to_string_lossy())?;
    storage_factory.migrate()?;

    assert_distinct_concurrent_adds(attach(Arc::new(storage_factory), Schema::rfc2307())?)
}

#[test]
fn it_leaves_gid_missing_when_uid_is_given() -> Result<()> {
    let session = directory()?.open_session()?;

    // Without gidNumber the account fails the schema check downstream.
    let err = session
        .add(Principal::Root, account("jacob").attr("uidNumber", "500").into())
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<DirectoryError>(),
        Some(DirectoryError::ObjectClassViolation(SchemaError::MissingRequired { .. }))
    ));

    Ok(())
}

#[test]
fn it_adds_accounts_that_bring_their_own_identifiers() -> Result<()> {
    let directory = directory()?;
    let session = directory.open_session()?;

    let given = session.add(
        Principal::Root,
        account("jacob").attr("uidNumber", "500").attr("gidNumber", "100").into(),
    )?;
    assert_eq!(identifiers(&given), ("500".to_owned(), "100".to_owned()));

    // Unseeded until now, so the scan sees 500.
    let assigned = session.add(Principal::Root, account("carla").into())?;
    assert_eq!(identifiers(&assigned), ("501".to_owned(), "501".to_owned()));

    Ok(())
}

#[test]
fn it_requires_identifiers_without_the_overlay() -> Result<()> {
    let directory = Directory::attach(
        memory::Factory::new(),
        Arc::new(Schema::rfc2307()),
        Arc::new(AllowAll::default()),
        &RegisteredOverlays::default(),
    )?;

    let err = directory
        .open_session()?
        .add(Principal::Root, account("jacob").into())
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<DirectoryError>(),
        Some(DirectoryError::ObjectClassViolation(_))
    ));

    Ok(())
}

#[test]
fn it_adds_nothing_for_principals_without_access() -> Result<()> {
    let acls = Acls::new(vec![
        AclRule::new(vec![Subject::Authenticated], Perm::Write).within(Dn::new("ou=groups,dc=example"))
    ]);
    let directory = Directory::attach(
        memory::Factory::new(),
        Arc::new(Schema::rfc2307()),
        Arc::new(acls),
        &overlays(),
    )?;

    let writer = Principal::Dn(Dn::new("uid=admin,dc=example"));
    let err = directory
        .open_session()?
        .add(writer, account("jacob").into())
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<DirectoryError>(),
        Some(DirectoryError::InsufficientAccess(_))
    ));
    assert!(directory.query_all()?.is_empty());

    Ok(())
}

#[test]
fn it_refuses_to_attach_without_posix_accounts() -> Result<()> {
    let schema = Schema::rfc2307().without_class(POSIX_ACCOUNT);

    let err = attach(memory::Factory::new(), schema).err().expect("refused");

    assert!(err.to_string().contains("posixAccount"));

    Ok(())
}

#[test]
fn it_rescans_when_attached_again() -> Result<()> {
    let storage_factory = memory::Factory::new();
    let directory = attach(storage_factory.clone(), Schema::rfc2307())?;
    directory.open_session()?.add(Principal::Root, account("jacob").into())?;

    directory.detach()?;

    assert!(directory.open_session().is_err());

    let attached = attach(storage_factory, Schema::rfc2307())?;
    let added = attached.open_session()?.add(Principal::Root, account("carla").into())?;

    assert_eq!(identifiers(&added), ("2".to_owned(), "2".to_owned()));

    Ok(())
}

#[test]
fn it_assigns_identifiers_on_sqlite() -> Result<()> {
    let storage_factory = sqlite::Factory::new(sqlite::MEMORY_SPECIAL)?;
    storage_factory.migrate()?;
    storage_factory
        .create_storage()?
        .add(&account("carla").attr("uidNumber", "0x10").attr("gidNumber", "16").into())?;

    let directory = attach(Arc::new(storage_factory), Schema::rfc2307())?;
    let session = directory.open_session()?;

    let first = session.add(Principal::Root, account("jacob").into())?;
    let second = session.add(Principal::Root, account("maria").into())?;

    assert_eq!(identifiers(&first), ("17".to_owned(), "17".to_owned()));
    assert_eq!(identifiers(&second), ("18".to_owned(), "18".to_owned()));

    let found = session.search(SearchRequest::everywhere("(uidNumber=18)".parse()?))?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].dn(), &Dn::new("uid=maria,ou=people,dc=example"));

    Ok(())
}
