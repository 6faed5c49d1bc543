mod discord_commands;
use anyhow::Context as _;
use poise::{Framework, FrameworkOptions, PrefixFrameworkOptions, serenity_prelude as serenity};
use std::sync::Arc;
use strikewatch_backend::config::Config;
use strikewatch_backend::{
    A2sQuery, DiscordBroadcaster, RasterFactory, StatusApp, StatusError, create_app,
};
use strikewatch_db::{Database, DbError};
use tokio::net::TcpListener;

type Context<'a> = poise::Context<'a, crate::Data, crate::discord_commands::Error>;

pub(crate) type LiveApp = StatusApp<A2sQuery, RasterFactory, DiscordBroadcaster>;

pub(crate) struct Data {
    pub(crate) app: Arc<LiveApp>,
}

#[tokio::main]
async fn main() {
    // Initialize tracing for structured logging
    #[cfg(debug_assertions)]
    let log_level = tracing::Level::DEBUG;
    #[cfg(not(debug_assertions))]
    let log_level = tracing::Level::INFO;

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();
    tracing::info!("Starting strikewatch...");

    if let Err(e) = run().await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Reply to failed commands with a readable message, leave the rest to poise.
async fn on_error(error: poise::FrameworkError<'_, Data, discord_commands::Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            tracing::error!(
                "Command '{}' failed: {}",
                ctx.command().qualified_name,
                error
            );
            let reply = if let Some(e) = error.downcast_ref::<StatusError>() {
                e.user_message()
            } else if error.downcast_ref::<DbError>().is_some() {
                "❌ Could not access saved settings. Please try again later.".to_string()
            } else {
                "❌ Something went wrong. Please try again later.".to_string()
            };
            if let Err(e) = ctx.say(reply).await {
                tracing::error!("Failed to send error reply: {}", e);
            }
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                tracing::error!("Error while handling error: {}", e);
            }
        }
    }
}

async fn run() -> anyhow::Result<()> {
    // Load configuration from environment variables or use defaults
    let config = Config::from_env();
    tracing::info!(
        "Configuration: port={}, db_path={}, query_timeout={}ms, cache_ttl={}ms, retries={}, image={}",
        config.port,
        config.database_path,
        config.query_timeout.as_millis(),
        config.cache_ttl.as_millis(),
        config.retry_count,
        config.generate_image
    );
    tracing::info!(
        "Schedule: enabled={}, every {}m, window {}-{}, image={}",
        config.schedule_enabled,
        config.schedule_interval_minutes,
        config.schedule_start.format("%H:%M"),
        config.schedule_end.format("%H:%M"),
        config.schedule_image
    );

    let token = config
        .discord_token
        .clone()
        .context("DISCORD_TOKEN must be set")?;

    // Commands are only registered once both collaborators are available
    let backend = A2sQuery::new().await?;
    let factory = match &config.font_path {
        Some(path) => {
            tracing::info!("Loading banner font from {}", path);
            RasterFactory::from_file(path)?
        }
        None => RasterFactory::bundled()?,
    };

    let db = Database::open(&config.database_path)
        .await
        .context("failed to open database")?;
    let app = Arc::new(
        StatusApp::new(
            config.clone(),
            db,
            backend,
            factory,
            DiscordBroadcaster::new(&token),
        )
        .await?,
    );
    if app.scheduler.start() {
        tracing::info!("Scheduled broadcasts resumed");
    }

    let router = create_app(Arc::clone(&app), config.request_timeout);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Status server listening on {}", addr);

    let intents =
        serenity::GatewayIntents::non_privileged() | serenity::GatewayIntents::MESSAGE_CONTENT;

    let data_app = Arc::clone(&app);
    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands: vec![
                discord_commands::query(),
                discord_commands::batch_query(),
                discord_commands::schedule(),
                discord_commands::status(),
                discord_commands::help(),
            ],
            prefix_options: PrefixFrameworkOptions {
                prefix: Some(config.command_prefix.clone()),
                ..Default::default()
            },
            on_error: |error| Box::pin(on_error(error)),
            pre_command: |ctx| {
                Box::pin(async move {
                    tracing::info!(
                        "Executing command '{}' by user '{}'",
                        ctx.command().qualified_name,
                        ctx.author().name
                    );
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    tracing::info!(
                        "Finished command '{}' by user '{}'",
                        ctx.command().qualified_name,
                        ctx.author().name
                    );
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                Ok(Data { app: data_app })
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await
        .context("failed to create Discord client")?;

    tokio::select! {
        result = axum::serve(listener, router) => {
            if let Err(e) = result {
                tracing::error!("Axum server error: {}", e);
            }
        }
        result = client.start() => {
            if let Err(e) = result {
                tracing::error!("Discord client error: {:?}", e);
            }
        }
    }

    app.scheduler.stop();
    Ok(())
}
