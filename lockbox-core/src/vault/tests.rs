use super::*;
use crate::database::MemoryRepository;

fn test_config() -> VaultConfig {
    VaultConfig {
        key_derivation_iterations: 1_000,
        authentication_iterations: 1_000,
        server_authentication_iterations: 1_000,
        item_encryption_key_bits: 1024,
    }
}

fn session_on(repository: Arc<MemoryRepository>) -> VaultSession {
    VaultSession::new(test_config(), repository).unwrap()
}

fn demo_item(password: &str) -> ItemData {
    ItemData {
        title: "demo".to_string(),
        username: "alice@example.com".to_string(),
        password: password.to_string(),
        url: "https://example.com".to_string(),
        notes: String::new(),
    }
}

#[tokio::test]
async fn test_create_local_user_unlocks() {
    let session = session_on(Arc::new(MemoryRepository::new()));
    assert_eq!(session.state(), SessionState::LoggedOut);

    session.create_local_user("alice", "Secret1!").await.unwrap();

    assert_eq!(session.state(), SessionState::Unlocked);
    assert_eq!(session.username().await.as_deref(), Some("alice"));
    assert!(session.items().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_user_rejected() {
    let repository = Arc::new(MemoryRepository::new());
    session_on(repository.clone())
        .create_local_user("alice", "Secret1!")
        .await
        .unwrap();

    let result = session_on(repository)
        .create_local_user("alice", "Other1!")
        .await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

#[tokio::test]
async fn test_lock_and_unlock_roundtrip() {
    let session = session_on(Arc::new(MemoryRepository::new()));
    session.create_local_user("alice", "Secret1!").await.unwrap();
    let id = session.create_item(demo_item("pw123")).await.unwrap();

    session.lock().await;
    assert_eq!(session.state(), SessionState::Locked);
    assert!(!session.is_unlocked().await);
    assert!(matches!(session.items().await, Err(Error::VaultLocked)));

    let wrong = session.unlock("WrongPass").await;
    assert!(matches!(wrong, Err(Error::DecryptMasterEncryptionKeyFailed)));
    assert!(wrong.unwrap_err().is_wrong_password());
    assert!(!session.is_unlocked().await);
    assert_eq!(session.state(), SessionState::Locked);

    session.unlock("Secret1!").await.unwrap();
    let items = session.items().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, id);
    assert_eq!(items[0].data.title, "demo");
    assert_eq!(items[0].data.password, "pw123");
    assert!(!items[0].read_only);
}

#[tokio::test]
async fn test_unlock_accepts_padded_password() {
    let session = session_on(Arc::new(MemoryRepository::new()));
    session.create_local_user("alice", "Secret1!").await.unwrap();
    session.lock().await;

    session.unlock("  Secret1!  ").await.unwrap();
    assert!(session.is_unlocked().await);
}

#[tokio::test]
async fn test_lock_during_unlock_ends_locked() {
    let config = VaultConfig {
        key_derivation_iterations: 100_000,
        ..test_config()
    };
    let session = VaultSession::new(config, Arc::new(MemoryRepository::new())).unwrap();
    session.create_local_user("alice", "Secret1!").await.unwrap();
    session.lock().await;

    let unlocking = {
        let session = session.clone();
        tokio::spawn(async move { session.unlock("Secret1!").await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    session.lock().await;

    let outcome = unlocking.await.unwrap();
    assert!(matches!(outcome, Ok(()) | Err(Error::Cancelled)));
    assert_eq!(session.state(), SessionState::Locked);
    assert!(!session.is_unlocked().await);
}

#[tokio::test]
async fn test_unlock_requires_login() {
    let session = session_on(Arc::new(MemoryRepository::new()));
    assert!(matches!(
        session.unlock("Secret1!").await,
        Err(Error::NotLoggedIn)
    ));
}

#[tokio::test]
async fn test_login_local_user() {
    let repository = Arc::new(MemoryRepository::new());
    session_on(repository.clone())
        .create_local_user("alice", "Secret1!")
        .await
        .unwrap();

    let session = session_on(repository);
    let wrong = session.login_local_user("alice", "WrongPass").await;
    assert!(matches!(wrong, Err(Error::AuthenticationFailed)));
    assert_eq!(session.state(), SessionState::LoggedOut);

    assert!(matches!(
        session.login_local_user("mallory", "Secret1!").await,
        Err(Error::NotFound(_))
    ));

    session.login_local_user("alice", "Secret1!").await.unwrap();
    assert_eq!(session.state(), SessionState::Locked);
    session.unlock("Secret1!").await.unwrap();
    assert_eq!(session.state(), SessionState::Unlocked);
}

#[tokio::test]
async fn test_update_item_bumps_modified() {
    let repository = Arc::new(MemoryRepository::new());
    let session = session_on(repository.clone());
    session.create_local_user("alice", "Secret1!").await.unwrap();
    let id = session.create_item(demo_item("pw123")).await.unwrap();
    let before = repository.find_item(&id).await.unwrap().unwrap();

    session.update_item(id, demo_item("n3w-pw")).await.unwrap();

    let after = repository.find_item(&id).await.unwrap().unwrap();
    assert!(after.modified > before.modified);
    assert_ne!(after.data, before.data);
    assert_eq!(session.items().await.unwrap()[0].data.password, "n3w-pw");

    session.lock().await;
    session.unlock("Secret1!").await.unwrap();
    assert_eq!(session.items().await.unwrap()[0].data.password, "n3w-pw");
}

#[tokio::test]
async fn test_delete_item_tombstones_item_and_authorizations() {
    let repository = Arc::new(MemoryRepository::new());
    let session = session_on(repository.clone());
    session.create_local_user("alice", "Secret1!").await.unwrap();
    let id = session.create_item(demo_item("pw123")).await.unwrap();

    session.delete_item(id).await.unwrap();

    let item = repository.find_item(&id).await.unwrap().unwrap();
    assert!(item.deleted);
    let authorizations = repository
        .find_item_authorizations_for_item(&item)
        .await
        .unwrap();
    assert_eq!(authorizations.len(), 1);
    assert!(authorizations.iter().all(|a| a.deleted));
    assert!(session.items().await.unwrap().is_empty());

    assert!(matches!(
        session.delete_item(id).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_change_master_password_locally() {
    let session = session_on(Arc::new(MemoryRepository::new()));
    session.create_local_user("alice", "Secret1!").await.unwrap();
    session.create_item(demo_item("pw123")).await.unwrap();

    assert!(matches!(
        session.change_master_password("WrongPass", "N3wSecret!").await,
        Err(Error::AuthenticationFailed)
    ));

    session
        .change_master_password("Secret1!", "N3wSecret!")
        .await
        .unwrap();
    session.lock().await;

    assert!(matches!(
        session.unlock("Secret1!").await,
        Err(Error::DecryptMasterEncryptionKeyFailed)
    ));
    session.unlock("N3wSecret!").await.unwrap();
    assert_eq!(session.items().await.unwrap()[0].data.password, "pw123");
}

#[tokio::test]
async fn test_change_master_password_requires_unlock() {
    let session = session_on(Arc::new(MemoryRepository::new()));
    session.create_local_user("alice", "Secret1!").await.unwrap();
    session.lock().await;

    assert!(matches!(
        session.change_master_password("Secret1!", "N3wSecret!").await,
        Err(Error::VaultLocked)
    ));
}

#[tokio::test]
async fn test_settings_roundtrip() {
    let session = session_on(Arc::new(MemoryRepository::new()));
    session.create_local_user("alice", "Secret1!").await.unwrap();
    assert_eq!(session.settings().await.unwrap(), UserSettings::default());

    let settings = UserSettings {
        auto_lock_timeout: 60,
        auto_lock_on_screen_off: false,
        clipboard_clear_timeout: 10,
    };
    session.update_settings(settings.clone()).await.unwrap();

    session.lock().await;
    session.unlock("Secret1!").await.unwrap();
    assert_eq!(session.settings().await.unwrap(), settings);
}

#[tokio::test]
async fn test_share_and_revoke() {
    let repository = Arc::new(MemoryRepository::new());
    let alice = session_on(repository.clone());
    let bob = session_on(repository.clone());
    alice.create_local_user("alice", "Secret1!").await.unwrap();
    bob.create_local_user("bob", "Hunter22!").await.unwrap();

    let id = alice.create_item(demo_item("pw123")).await.unwrap();
    let authorization_id = alice.share_item(id, "bob", true).await.unwrap();
    assert!(matches!(
        alice.share_item(id, "bob", false).await,
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        alice.share_item(id, "carol", false).await,
        Err(Error::NotFound(_))
    ));

    bob.lock().await;
    bob.unlock("Hunter22!").await.unwrap();
    let shared = bob.items().await.unwrap();
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].data.password, "pw123");
    assert!(shared[0].read_only);

    assert!(matches!(
        bob.update_item(id, demo_item("stolen")).await,
        Err(Error::PermissionDenied(_))
    ));
    assert!(matches!(
        bob.share_item(id, "alice", false).await,
        Err(Error::PermissionDenied(_))
    ));
    assert!(matches!(
        bob.delete_item(id).await,
        Err(Error::PermissionDenied(_))
    ));
    assert!(matches!(
        bob.revoke_item_authorization(authorization_id).await,
        Err(Error::PermissionDenied(_))
    ));

    alice
        .revoke_item_authorization(authorization_id)
        .await
        .unwrap();
    bob.lock().await;
    bob.unlock("Hunter22!").await.unwrap();
    assert!(bob.items().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_owner_authorization_cannot_be_revoked() {
    let repository = Arc::new(MemoryRepository::new());
    let session = session_on(repository.clone());
    session.create_local_user("alice", "Secret1!").await.unwrap();
    let id = session.create_item(demo_item("pw123")).await.unwrap();

    let item = repository.find_item(&id).await.unwrap().unwrap();
    let own = repository
        .find_item_authorizations_for_item(&item)
        .await
        .unwrap()
        .remove(0);

    assert!(matches!(
        session.revoke_item_authorization(own.id).await,
        Err(Error::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_state_is_broadcast() {
    let session = session_on(Arc::new(MemoryRepository::new()));
    let mut states = session.subscribe();
    assert_eq!(*states.borrow(), SessionState::LoggedOut);

    session.create_local_user("alice", "Secret1!").await.unwrap();
    states.changed().await.unwrap();
    assert_eq!(*states.borrow_and_update(), SessionState::Unlocked);

    session.lock().await;
    states.changed().await.unwrap();
    assert_eq!(*states.borrow_and_update(), SessionState::Locked);
}

#[tokio::test]
async fn test_logout_resets_store() {
    let repository = Arc::new(MemoryRepository::new());
    let session = session_on(repository.clone());
    session.create_local_user("alice", "Secret1!").await.unwrap();
    session.create_item(demo_item("pw123")).await.unwrap();

    session.logout().await.unwrap();

    assert_eq!(session.state(), SessionState::LoggedOut);
    assert!(session.username().await.is_none());
    assert!(!session.is_unlocked().await);
    assert!(repository.find_all_users().await.unwrap().is_empty());
    assert!(repository.find_all_items().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_synchronize_needs_webservice() {
    let session = session_on(Arc::new(MemoryRepository::new()));
    session.create_local_user("alice", "Secret1!").await.unwrap();
    assert!(matches!(
        session.synchronize().await,
        Err(Error::InvalidInput(_))
    ));
}

#[test]
fn test_rejects_invalid_config() {
    let config = VaultConfig {
        key_derivation_iterations: 1,
        ..test_config()
    };
    assert!(matches!(
        VaultSession::new(config, Arc::new(MemoryRepository::new())),
        Err(Error::Config(_))
    ));
}
