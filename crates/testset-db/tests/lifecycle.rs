//! Integration tests for the test lifecycle.
//!
//! Each test plays the part of a test runner: it initializes the controller
//! for a few test methods in a row, lets them change the database, and
//! checks what the next test starts from.

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqliteConnection;

use common::{CountingTestSet, TestDb, applied, default_test_set, scripts_dir};
use mockall::mock;
use testset_core::{
    BufferedOutputSink, CleanupPolicy, NoopOutputSink, SessionCache, SettingsResolver,
    TestIdentity, TestOutputSink, TestSetDeclaration,
};
use testset_db::{
    ApplyMode, DatabaseTestClass, DbSession, GuardStatus, LifecycleController, LifecyclePhase,
    SqlScriptTestSet, TestDatabaseConfig, TestSet, TestSetError, TestSetRegistry,
    TransactionGuard,
};

const CLASS: &str = "acme::tests::ProductRepositoryTest";

mock! {
    Sink {}

    impl TestOutputSink for Sink {
        fn write_line(&self, line: &str);
    }
}

fn product_tests() -> SettingsResolver {
    let mut resolver = SettingsResolver::new();
    resolver
        .register_class(CLASS)
        .method("get_all_products", [])
        .method("delete_product", [])
        .method(
            "add_batch_commits",
            [TestSetDeclaration::with_cleanup(CleanupPolicy::ByReinitialize)],
        )
        .method(
            "rename_product_keeps_changes",
            [TestSetDeclaration::with_cleanup(CleanupPolicy::None)],
        )
        .method("starts_empty", [TestSetDeclaration::named("Empty")])
        .method("uses_broken_set", [TestSetDeclaration::named("Broken")]);
    resolver
}

fn test(method: &str) -> TestIdentity {
    TestIdentity::new(CLASS, method)
}

fn registry(db: &TestDb) -> TestSetRegistry {
    let mut registry = TestSetRegistry::new(db.config());
    registry
        .define("Default", |setup| {
            setup
                .from_sql_script_dir(scripts_dir())
                .with_names_matching(|name| name.starts_with("default_"))
                .build()
        })
        .unwrap();
    registry
        .define("Empty", |setup| {
            setup
                .from_sql_script_dir(scripts_dir())
                .with_names_matching(|name| name.starts_with("empty_"))
                .build()
        })
        .unwrap();
    registry
}

fn controller(db: &TestDb, cache: &SessionCache) -> LifecycleController {
    LifecycleController::new(registry(db), Arc::new(product_tests()), cache.clone())
        .with_output_sink(Arc::new(NoopOutputSink))
}

async fn product_count(controller: &mut LifecycleController) -> i64 {
    controller
        .session()
        .unwrap()
        .row_count("products")
        .await
        .unwrap()
}

#[tokio::test]
async fn test_rollback_restores_row_count() {
    let db = TestDb::new().unwrap();
    let cache = SessionCache::new();
    let mut controller = controller(&db, &cache);

    controller.initialize(&test("delete_product")).await.unwrap();
    assert_eq!(controller.phase(), LifecyclePhase::Initialized);
    assert_eq!(product_count(&mut controller).await, 3);

    let deleted = controller
        .session()
        .unwrap()
        .execute("DELETE FROM products WHERE code = 'P-001'")
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(product_count(&mut controller).await, 2);
    controller.cleanup().await.unwrap();
    assert_eq!(controller.phase(), LifecyclePhase::CleanedUp);

    controller.initialize(&test("get_all_products")).await.unwrap();
    assert_eq!(product_count(&mut controller).await, 3);
    controller.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_consecutive_default_tests_apply_once() {
    let db = TestDb::new().unwrap();
    let cache = SessionCache::new();
    let (counting, counter) = CountingTestSet::new(default_test_set());
    let mut registry = TestSetRegistry::new(db.config());
    registry.insert("Default", counting);

    let mut controller = LifecycleController::new(registry, Arc::new(product_tests()), cache)
        .with_output_sink(Arc::new(NoopOutputSink));

    for method in ["get_all_products", "delete_product", "get_all_products"] {
        controller.initialize(&test(method)).await.unwrap();
        assert_eq!(product_count(&mut controller).await, 3);
        controller.cleanup().await.unwrap();
    }

    assert_eq!(applied(&counter), 1);
}

#[tokio::test]
async fn test_reinitialize_policy_forces_reapply_of_same_name() {
    let db = TestDb::new().unwrap();
    let cache = SessionCache::new();
    let (counting, counter) = CountingTestSet::new(default_test_set());
    let mut registry = TestSetRegistry::new(db.config());
    registry.insert("Default", counting);
    let mut controller = LifecycleController::new(registry, Arc::new(product_tests()), cache)
        .with_output_sink(Arc::new(NoopOutputSink));

    controller.initialize(&test("add_batch_commits")).await.unwrap();
    assert!(controller.session().unwrap().guard().is_none());
    controller
        .session()
        .unwrap()
        .execute("INSERT INTO products (code, name, price) VALUES ('P-100', 'Mixer', 80.0)")
        .await
        .unwrap();
    controller.cleanup().await.unwrap();
    assert_eq!(applied(&counter), 1);

    // Nothing was rolled back, so the next test starts from a fresh apply.
    controller.initialize(&test("get_all_products")).await.unwrap();
    assert_eq!(applied(&counter), 2);
    assert_eq!(product_count(&mut controller).await, 3);
    controller.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_switching_test_set_reapplies() {
    let db = TestDb::new().unwrap();
    let cache = SessionCache::new();
    let mut controller = controller(&db, &cache);

    controller.initialize(&test("get_all_products")).await.unwrap();
    assert_eq!(product_count(&mut controller).await, 3);
    controller.cleanup().await.unwrap();

    controller.initialize(&test("starts_empty")).await.unwrap();
    assert_eq!(product_count(&mut controller).await, 0);
    controller.cleanup().await.unwrap();

    controller.initialize(&test("get_all_products")).await.unwrap();
    assert_eq!(product_count(&mut controller).await, 3);
    controller.cleanup().await.unwrap();

    let remembered = cache.snapshot();
    assert_eq!(remembered.test_set_name.as_deref(), Some("Default"));
    assert_eq!(remembered.cleanup, CleanupPolicy::ByRollback);
}

#[tokio::test]
async fn test_policy_none_keeps_changes() {
    let db = TestDb::new().unwrap();
    let cache = SessionCache::new();
    let mut controller = controller(&db, &cache);

    controller
        .initialize(&test("rename_product_keeps_changes"))
        .await
        .unwrap();
    assert!(!controller.session().unwrap().in_transaction());
    controller
        .session()
        .unwrap()
        .execute("DELETE FROM products")
        .await
        .unwrap();
    controller.cleanup().await.unwrap();

    // Same test set and the previous policy wasn't ByReinitialize: reused as-is.
    controller.initialize(&test("get_all_products")).await.unwrap();
    assert_eq!(product_count(&mut controller).await, 0);
    controller.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_unknown_test_set_fails_initialize() {
    let db = TestDb::new().unwrap();
    let cache = SessionCache::new();
    let mut controller = controller(&db, &cache);

    let err = controller
        .initialize(&test("uses_broken_set"))
        .await
        .unwrap_err();
    assert!(matches!(err, TestSetError::UnknownTestSet(name) if name == "Broken"));
    assert_eq!(controller.phase(), LifecyclePhase::Idle);
    assert!(cache.snapshot().invalidated);

    // Cleanup after a failed initialize has nothing to release.
    controller.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_unregistered_method_fails_resolution() {
    let db = TestDb::new().unwrap();
    let cache = SessionCache::new();
    let mut controller = controller(&db, &cache);

    let err = controller
        .initialize(&test("not_a_test"))
        .await
        .unwrap_err();
    assert!(matches!(err, TestSetError::Resolution(_)));
}

#[tokio::test]
async fn test_initialize_twice_is_rejected() {
    let db = TestDb::new().unwrap();
    let cache = SessionCache::new();
    let mut controller = controller(&db, &cache);

    controller.initialize(&test("get_all_products")).await.unwrap();
    let err = controller
        .initialize(&test("delete_product"))
        .await
        .unwrap_err();
    assert!(matches!(err, TestSetError::AlreadyInitialized(_)));
    assert_eq!(
        controller.current_test().map(|t| t.method_name.as_str()),
        Some("get_all_products")
    );

    controller.cleanup().await.unwrap();
    controller.cleanup().await.unwrap();
    assert_eq!(controller.phase(), LifecyclePhase::CleanedUp);
}

#[tokio::test]
async fn test_nested_begin_fails_under_rollback_policy() {
    let db = TestDb::new().unwrap();
    let cache = SessionCache::new();
    let mut controller = controller(&db, &cache);

    controller.initialize(&test("delete_product")).await.unwrap();
    let result = controller.session().unwrap().execute("BEGIN").await;
    assert!(matches!(result, Err(TestSetError::Database(_))));
    controller.cleanup().await.unwrap();

    controller.initialize(&test("add_batch_commits")).await.unwrap();
    let session = controller.session().unwrap();
    session.execute("BEGIN").await.unwrap();
    session
        .execute("INSERT INTO products (code, name, price) VALUES ('P-200', 'Grill', 120.0)")
        .await
        .unwrap();
    session.execute("COMMIT").await.unwrap();
    assert_eq!(session.row_count("products").await.unwrap(), 4);
    controller.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_unique_violation_propagates_from_apply() {
    let db = TestDb::new().unwrap();
    let cache = SessionCache::new();
    let mut registry = registry(&db);
    registry
        .define("Broken", |setup| {
            setup
                .from_embedded_sql_scripts([(
                    "duplicates.sql",
                    "INSERT INTO products (code, name, price) VALUES ('P-001', 'Again', 1.0)",
                )])
                .all()
                .build()
        })
        .unwrap();
    let mut controller = LifecycleController::new(registry, Arc::new(product_tests()), cache.clone())
        .with_output_sink(Arc::new(NoopOutputSink));

    controller.initialize(&test("get_all_products")).await.unwrap();
    controller.cleanup().await.unwrap();

    let err = controller
        .initialize(&test("uses_broken_set"))
        .await
        .unwrap_err();
    assert!(matches!(err, TestSetError::Database(_)));
    assert!(err.is_unique_violation());
    assert!(cache.snapshot().invalidated);

    // The failed apply invalidated the cache, so Default is applied again.
    controller.initialize(&test("get_all_products")).await.unwrap();
    assert!(!cache.snapshot().invalidated);
    assert_eq!(product_count(&mut controller).await, 3);
    controller.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_atomic_apply_rolls_back_partial_test_set() {
    let db = TestDb::new().unwrap();
    let mut registry = TestSetRegistry::new(db.config().with_apply_mode(ApplyMode::Atomic));
    registry.insert("Default", default_test_set());
    registry.insert(
        "Partial",
        SqlScriptTestSet::new().with_sql_script(
            "partial.sql",
            "DELETE FROM products\nGO\nINSERT INTO missing_table VALUES (1)\n",
        ),
    );

    registry.apply("Default").await.unwrap();
    assert!(registry.apply("Partial").await.is_err());

    let mut session = DbSession::open(db.connection_string()).await.unwrap();
    assert_eq!(session.row_count("products").await.unwrap(), 3);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_direct_apply_keeps_partial_test_set() {
    let db = TestDb::new().unwrap();
    let mut registry = TestSetRegistry::new(db.config());
    registry.insert("Default", default_test_set());
    registry.insert(
        "Partial",
        SqlScriptTestSet::new().with_sql_script(
            "partial.sql",
            "DELETE FROM products\nGO\nINSERT INTO missing_table VALUES (1)\n",
        ),
    );

    registry.apply("Default").await.unwrap();
    assert!(registry.apply("Partial").await.is_err());

    let mut session = DbSession::open(db.connection_string()).await.unwrap();
    assert_eq!(session.row_count("products").await.unwrap(), 0);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_aborted_transaction_allows_verification_queries() {
    let db = TestDb::new().unwrap();
    let cache = SessionCache::new();
    let mut controller = controller(&db, &cache);

    controller.initialize(&test("delete_product")).await.unwrap();
    let session = controller.session().unwrap();
    session.execute("DELETE FROM products WHERE code = 'P-003'").await.unwrap();

    // The code under test hits a conflict that ends the whole transaction.
    let conflict = session
        .execute("INSERT OR ROLLBACK INTO products (code, name, price) VALUES ('P-001', 'Dup', 1.0)")
        .await
        .unwrap_err();
    assert!(conflict.is_unique_violation());

    assert_eq!(session.row_count("products").await.unwrap(), 3);
    assert_eq!(
        session.guard().map(TransactionGuard::status),
        Some(GuardStatus::Detached)
    );
    assert!(!session.in_transaction());

    controller.cleanup().await.unwrap();
    assert!(cache.snapshot().invalidated);
}

#[tokio::test]
async fn test_output_sink_reports_lifecycle_steps() {
    let db = TestDb::new().unwrap();
    let cache = SessionCache::new();
    let sink = Arc::new(BufferedOutputSink::new());
    let mut controller = controller(&db, &cache).with_output_sink(sink.clone());

    controller.initialize(&test("delete_product")).await.unwrap();
    controller.cleanup().await.unwrap();
    controller.initialize(&test("add_batch_commits")).await.unwrap();
    controller.cleanup().await.unwrap();

    assert_eq!(
        sink.take_lines(),
        vec![
            "Applying test set \"Default\"...",
            "Beginning encapsulating transaction...",
            "Rolling back encapsulating transaction...",
        ]
    );
}

#[tokio::test]
async fn test_apply_is_announced_once_per_reapply() {
    let db = TestDb::new().unwrap();
    let cache = SessionCache::new();

    let mut sink = MockSink::new();
    sink.expect_write_line()
        .withf(|line| line.starts_with("Applying test set"))
        .times(1)
        .return_const(());
    sink.expect_write_line()
        .withf(|line| !line.starts_with("Applying test set"))
        .return_const(());

    let mut controller = controller(&db, &cache).with_output_sink(Arc::new(sink));
    for method in ["get_all_products", "delete_product"] {
        controller.initialize(&test(method)).await.unwrap();
        controller.cleanup().await.unwrap();
    }
}

struct ProductRepositoryTest {
    connection_string: String,
}

impl DatabaseTestClass for ProductRepositoryTest {
    fn config(&self) -> TestDatabaseConfig {
        TestDatabaseConfig::new(self.connection_string.clone())
    }

    fn define_test_sets(&self, registry: &mut TestSetRegistry) -> Result<(), TestSetError> {
        registry.define("Default", |setup| {
            setup
                .from_sql_script_dir(scripts_dir())
                .with_names_matching(|name| name.starts_with("default_"))
                .build()
        })
    }
}

#[tokio::test]
async fn test_controller_for_test_class() {
    let db = TestDb::new().unwrap();
    let class = ProductRepositoryTest {
        connection_string: db.connection_string().to_string(),
    };
    let mut controller =
        LifecycleController::for_test_class(&class, Arc::new(product_tests()), SessionCache::new())
            .unwrap()
            .with_output_sink(Arc::new(NoopOutputSink));

    assert!(controller.registry().contains("default"));
    controller.initialize(&test("get_all_products")).await.unwrap();
    let name = controller
        .session()
        .unwrap()
        .execute_scalar("SELECT name FROM products WHERE code = 'P-002'")
        .await
        .unwrap();
    assert_eq!(name.as_ref().and_then(|v| v.as_str()), Some("Toaster"));
    assert_eq!(
        controller.settings().map(|s| s.cleanup),
        Some(CleanupPolicy::ByRollback)
    );
    controller.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_drop_without_cleanup_invalidates_cache() {
    let db = TestDb::new().unwrap();
    let cache = SessionCache::new();
    {
        let mut controller = controller(&db, &cache);
        controller.initialize(&test("get_all_products")).await.unwrap();
    }
    assert!(cache.snapshot().invalidated);
}

/// Applies fine but deletes the database directory, so the test's own
/// session can't be opened afterwards.
struct RemovesDatabaseDir {
    dir: PathBuf,
}

#[async_trait]
impl TestSet for RemovesDatabaseDir {
    async fn apply(&self, _conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        std::fs::remove_dir_all(&self.dir).map_err(sqlx::Error::Io)
    }
}

#[tokio::test]
async fn test_session_open_failure_after_apply_invalidates_cache() {
    let db = TestDb::new().unwrap();
    let cache = SessionCache::new();
    let mut registry = registry(&db);
    registry.insert(
        "Broken",
        RemovesDatabaseDir {
            dir: db.dir().to_path_buf(),
        },
    );
    let mut controller = LifecycleController::new(registry, Arc::new(product_tests()), cache.clone())
        .with_output_sink(Arc::new(NoopOutputSink));

    controller.initialize(&test("get_all_products")).await.unwrap();
    controller.cleanup().await.unwrap();
    assert!(!cache.needs_reapply("Default"));

    let err = controller
        .initialize(&test("uses_broken_set"))
        .await
        .unwrap_err();
    assert!(matches!(err, TestSetError::Database(_)));
    assert_eq!(controller.phase(), LifecyclePhase::CleanedUp);

    let remembered = cache.snapshot();
    assert_eq!(remembered.test_set_name.as_deref(), Some("Broken"));
    assert!(remembered.invalidated);
    assert!(cache.needs_reapply("Default"));
}
