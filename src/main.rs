use tracing_subscriber::EnvFilter;

#[rocket::main]
async fn main() -> Result<(), rocket::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let pool = conduit::db::init_pool().expect("failed to create database pool");
    let _ = conduit::rocket(pool).launch().await?;
    Ok(())
}
