use std::sync::Arc;

use tokio::net::TcpListener;

use easel_lib::ai::google_search::GoogleImageSearch;
use easel_lib::ai::openai_speech::OpenAiSpeechClient;
use easel_lib::ai::openai_vision::OpenAiVisionClient;
use easel_lib::ai::ImageSearchProvider;
use easel_lib::pipeline::AnalysisPipeline;
use easel_lib::server::EaselServer;
use easel_lib::settings::Settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::from_env();
    settings.log_credential_status();

    let missing = settings.missing_credentials();
    if !missing.is_empty() {
        log::error!("Missing required environment variables: {}", missing.join(", "));
        std::process::exit(1);
    }

    let search = GoogleImageSearch::new(
        non_empty(&settings.google_api_key),
        non_empty(&settings.google_cse_id),
    );

    // One-shot search self-test: easel --test-search "cat drawing"
    let mut args = std::env::args().skip(1);
    if let Some("--test-search") = args.next().as_deref() {
        let query = args.next().unwrap_or_else(|| "cat drawing".into());
        log::info!("Testing search with query: {}", query);
        let images = search.search(&query, settings.reference_image_count).await?;
        for url in &images {
            println!("{}", url);
        }
        log::info!("Search test returned {} result(s)", images.len());
        return Ok(());
    }

    let vision = Arc::new(OpenAiVisionClient::new(
        settings.openai_api_key.clone(),
        settings.vision_model.clone(),
    ));
    let speech = Arc::new(OpenAiSpeechClient::new(
        settings.openai_api_key.clone(),
        settings.speech_model.clone(),
        settings.speech_voice.clone(),
    ));

    let pipeline = Arc::new(AnalysisPipeline::new(
        settings.clone(),
        vision,
        speech,
        Arc::new(search),
    ));
    let server = Arc::new(EaselServer::new(settings.allowed_origin.clone(), pipeline));

    let listener = TcpListener::bind(("0.0.0.0", settings.port)).await?;
    log::info!("Server running on port {}", settings.port);

    tokio::select! {
        _ = server.run(listener) => {}
        _ = tokio::signal::ctrl_c() => {
            log::info!("Shutting down");
        }
    }

    Ok(())
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
