use std::net::TcpListener;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use skin_lesion_service::config::{Config, DEFAULT_SECRET_KEY};
use skin_lesion_service::model::TfModel;
use skin_lesion_service::routes::{self, AppState};
use skin_lesion_service::{download, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = Config::from_env()?;
    logging::init(&config)?;

    if !config.debug && config.secret_key == DEFAULT_SECRET_KEY {
        warn!("SECRET_KEY is the development default, set it in production");
    }

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("creating upload dir {}", config.upload_dir.display()))?;

    download::ensure_model_present(&config.model).await?;
    let model = TfModel::load(&config.model).context("Failed to load model")?;
    model.check_input_shape(&config.input_shape())?;
    info!(compile = ?model.compile_settings(), "model ready");

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .with_context(|| format!("binding {}:{}", config.host, config.port))?;
    let state = Arc::new(AppState {
        config,
        classifier: Arc::new(model),
    });
    let app = routes::router(state);

    info!("Listening on http://{}", listener.local_addr()?);
    axum::Server::from_tcp(listener)?
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
