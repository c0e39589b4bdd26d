use anyhow::Result;
use dog_upload_axum::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let server = ServerConfig::from_env()?;
    let app = dog_upload_axum::build(&server).await?;

    let addr = server.addr();
    println!("[dog-upload] listening on http://{addr}");

    app.listen(addr).await?;

    Ok(())
}
