use sea_orm::{ConnectionTrait, Database, DatabaseConnection};

#[allow(dead_code)]
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[cfg(test)]
#[allow(dead_code)]
pub async fn setup_test_db(statements: &[&str]) -> DatabaseConnection {
    init_logging();
    let db = Database::connect("sqlite::memory:").await.unwrap();
    for statement in statements {
        db.execute_unprepared(statement).await.unwrap();
    }
    db
}
