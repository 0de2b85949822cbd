use import_table::db::MIGRATOR;
use import_table::test_support::TestDatabase;

async fn import_jobs_tables(pool: &sqlx::SqlitePool) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'import_jobs'",
    )
    .fetch_one(pool)
    .await
    .expect("lookup succeeded")
}

#[tokio::test]
async fn migrations_apply_and_revert_cleanly() {
    let test_db = TestDatabase::on_disk()
        .await
        .expect("failed to provision test database");
    assert!(test_db.path().is_some_and(|path| path.exists()));

    let pool = test_db.pool_clone();

    MIGRATOR.run(&pool).await.expect("migrations run");
    assert_eq!(import_jobs_tables(&pool).await, 1);

    MIGRATOR
        .undo(&pool, 0)
        .await
        .expect("migrations revert");
    assert_eq!(
        import_jobs_tables(&pool).await,
        0,
        "import_jobs should be dropped after revert"
    );

    MIGRATOR.run(&pool).await.expect("migrations rerun");
    assert_eq!(import_jobs_tables(&pool).await, 1);

    test_db.reset().await.expect("reset is idempotent");
    test_db.close().await;
}
