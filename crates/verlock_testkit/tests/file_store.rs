//! Sessions over a file-backed store.

use std::sync::Arc;
use verlock_core::{LockMode, SessionManager};
use verlock_store::{FileStore, RecordStore};
use verlock_testkit::prelude::*;

#[test]
fn committed_writes_survive_reopen() {
    let env = TestEnv::file();
    let path = env.path().unwrap();
    let id = env.seed_account("Ana", 10);

    let session = env.session("User1");
    let mapper = env.accounts();
    assert!(session.lock_manager().get_lock(id, LockMode::Write));
    let account = mapper.find(&session, id).unwrap().unwrap();
    account.write().balance = 75;
    mapper.update(&session, &account).unwrap();

    let reopened: Arc<dyn RecordStore> = Arc::new(FileStore::open(&path).unwrap());
    let manager = SessionManager::new(reopened);
    let reader = manager.get_session(manager.open("User2")).unwrap();
    let found = mapper.find(&reader, id).unwrap().unwrap();

    assert_eq!(found.read().balance, 75);
    assert_eq!(found.version().value(), 1);
    assert_eq!(found.version().modified_by(), "User1");
}

#[test]
fn deletes_survive_reopen() {
    with_file_env(|env| {
        let path = env.path().unwrap();
        let kept = env.seed_account("Ana", 10);
        let removed = env.seed_account("Bia", 20);
        let mapper = env.accounts();

        let session = env.session("User1");
        assert!(session.lock_manager().get_lock(removed, LockMode::Write));
        let account = mapper.find(&session, removed).unwrap().unwrap();
        mapper.delete(&session, &account).unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.contents().row_count("Accounts"), 1);
        assert_eq!(reopened.contents().row_count("VersionLock"), 1);

        let manager = SessionManager::new(Arc::new(reopened));
        let reader = manager.get_session(manager.open("User2")).unwrap();
        assert!(mapper.find(&reader, kept).unwrap().is_some());
        assert!(mapper.find(&reader, removed).unwrap_err().is_not_found());
    });
}
