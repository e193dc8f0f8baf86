#[tokio::main]
async fn main() {
    ratings_observability::init();

    let config = ratings_infra::Config::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "invalid configuration, exiting");
        std::process::exit(1);
    });

    if let Some(kafka) = &config.kafka_bootstrap_servers {
        tracing::warn!(
            kafka_bootstrap_servers = %kafka,
            "KAFKA_BOOTSTRAP_SERVERS is recognized but unused; this deployment publishes the ratings stream over REDIS_URL"
        );
    }

    let app = ratings_api::app::build_app(config).await;

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
        .await
        .expect("failed to bind 0.0.0.0:8080");

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
