use cvitanok_core::{App, logging};

#[tokio::main]
async fn main() -> Result<(), cvitanok_core::provider::BoxError> {
    let _ = dotenvy::dotenv();
    let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
    logging::init_for_environment(&environment);

    let app = App::new().await?;
    app.run().await
}
