use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use terabox_courier::bot::handlers::{self, Command};
use terabox_courier::config::{Settings, PROBE_TIMEOUT_SECS};
use terabox_courier::job::{
    Aria2Downloader, FfprobeProbe, HttpMetadataResolver, JobPipeline, PipelineConfig,
};
use terabox_courier::logging::{init_logging, RedactionPatterns};
use terabox_courier::storage::{JsonUserStore, UserStore};
use terabox_courier::web;
use tracing::{error, info, warn};

/// Connect timeout for Bot API requests; uploads themselves are bounded by the pipeline
const TELEGRAM_CONNECT_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    // Settings are needed for the log file path, so failures here go to stderr
    let settings = match Settings::new() {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = init_logging(&patterns, &settings.log_file);
    info!("🚀 Starting Terabox Downloader Bot...");

    if let Err(e) = tokio::fs::create_dir_all(&settings.download_dir).await {
        error!(
            dir = %settings.download_dir.display(),
            error = %e,
            "Failed to create download directory"
        );
        std::process::exit(1);
    }

    let store = init_store(&settings).await;
    let pipeline = init_pipeline(&settings);
    let bot = init_bot(&settings)?;

    // Health-check server runs beside the bot; a bind failure is not fatal
    let port = settings.port;
    tokio::spawn(async move {
        if let Err(e) = web::serve(port).await {
            warn!(port, error = %e, "Health-check server stopped");
        }
    });

    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![settings, store, pipeline])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn init_store(settings: &Settings) -> Arc<dyn UserStore> {
    let store = JsonUserStore::load(&settings.authorized_users_file).await;
    info!(
        path = %store.path().display(),
        owner_id = settings.bot_owner_id,
        "Authorized user store ready"
    );
    Arc::new(store)
}

fn init_pipeline(settings: &Settings) -> Arc<JobPipeline> {
    let config = PipelineConfig::from_settings(settings);
    info!(
        max_size_bytes = config.max_size_bytes,
        supports_streaming = config.supports_streaming,
        has_spoiler = config.has_spoiler,
        "Job pipeline configured"
    );
    Arc::new(JobPipeline::new(
        Arc::new(HttpMetadataResolver::new(settings.terabox_api.clone())),
        Arc::new(Aria2Downloader::new(settings.aria2c_bin.clone())),
        Arc::new(FfprobeProbe::new(
            settings.ffprobe_bin.clone(),
            Duration::from_secs(PROBE_TIMEOUT_SECS),
        )),
        config,
    ))
}

fn init_bot(settings: &Settings) -> Result<Bot, Box<dyn std::error::Error>> {
    // No overall request timeout: large uploads would hit it
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(TELEGRAM_CONNECT_TIMEOUT_SECS))
        .tcp_nodelay(true)
        .build()?;
    let bot = Bot::with_client(settings.bot_token.clone(), client);

    match settings.telegram_api_url.as_deref() {
        Some(url) => {
            let url = reqwest::Url::parse(url)?;
            info!(api_url = %url, "Using custom Bot API server");
            Ok(bot.set_api_url(url))
        }
        None => Ok(bot),
    }
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_callback))
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(
                    dptree::filter(|msg: Message| msg.chat.is_private() && msg.text().is_some())
                        .endpoint(handle_text_message),
                ),
        )
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    settings: Arc<Settings>,
    store: Arc<dyn UserStore>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start if msg.chat.is_private() => handlers::start(bot, msg, settings).await,
        Command::Start => Ok(()),
        Command::AddUser(arg) => handlers::add_user(bot, msg, arg, settings, store).await,
        Command::RemoveUser(arg) => handlers::remove_user(bot, msg, arg, settings, store).await,
        Command::UserList => handlers::user_list(bot, msg, settings, store).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_text_message(
    bot: Bot,
    msg: Message,
    settings: Arc<Settings>,
    store: Arc<dyn UserStore>,
    pipeline: Arc<JobPipeline>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::handle_text(bot, msg, settings, store, pipeline).await {
        error!("Text handler error: {}", e);
    }
    respond(())
}

async fn handle_callback(bot: Bot, q: CallbackQuery) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::handle_callback(bot, q).await {
        error!("Callback handler error: {}", e);
    }
    respond(())
}
