use crate::Context;
use poise::CreateReply;
use poise::command;
use poise::serenity_prelude::CreateAttachment;
use strikewatch_backend::Payload;
use strikewatch_backend::address::parse_address;
use strikewatch_backend::broadcast::IMAGE_NAME;
use strikewatch_backend::helpers::{BatchAction, now, parse_batch_args, prefers_image};
use strikewatch_backend::schedule::{SkipReason, TickOutcome};
use strikewatch_db::DbError;

pub(crate) type Error = Box<dyn std::error::Error + Send + Sync>;

const BATCH_USAGE: &str = "Usage: `/batch-query [addresses...] [image|text]` or `/batch-query list|add <address>|remove <n>|clear`";

async fn send_payload(ctx: Context<'_>, payload: Payload) -> Result<(), Error> {
    match payload {
        Payload::Text(text) => {
            ctx.say(text).await?;
        }
        Payload::Image(png) => {
            ctx.send(CreateReply::default().attachment(CreateAttachment::bytes(png, IMAGE_NAME)))
                .await?;
        }
    }
    Ok(())
}

/// Query a Counter-Strike server for its live status
#[command(slash_command, prefix_command)]
pub async fn query(
    ctx: Context<'_>,
    #[description = "Server address, e.g. 1.2.3.4:27015"] address: Option<String>,
    #[description = "Reply with an image"] image: Option<bool>,
    #[description = "Reply with text"] text: Option<bool>,
    #[description = "Clear cached results instead of querying"] clear: Option<bool>,
) -> Result<(), Error> {
    let app = &ctx.data().app;

    if clear.unwrap_or(false) {
        let removed = app.queries.clear_cache().await;
        ctx.say(format!("🧹 Cleared {} cached result(s)", removed)).await?;
        return Ok(());
    }

    let Some(address) = address else {
        ctx.say("❌ Please provide a server address.\nUsage: `/query 1.2.3.4:27015`")
            .await?;
        return Ok(());
    };

    ctx.defer().await?;
    let info = match app.query_server(&address).await {
        Ok(info) => info,
        Err(e) => {
            ctx.say(e.user_message()).await?;
            return Ok(());
        }
    };

    let image = prefers_image(image, text, app.config.generate_image);
    match app.server_payload(&info, image) {
        Ok(payload) => send_payload(ctx, payload).await,
        Err(e) => {
            tracing::warn!(error = %e, "status banner failed, replying with text");
            ctx.say(format!("⚠️ {}\n\n{}", e, app.server_text(&info)))
                .await?;
            Ok(())
        }
    }
}

/// Query several servers at once, or manage the saved server list
#[command(slash_command, prefix_command, rename = "batch-query")]
pub async fn batch_query(
    ctx: Context<'_>,
    #[description = "Addresses (default: saved list), or list / add <address> / remove <n> / clear"]
    #[rest]
    args: Option<String>,
) -> Result<(), Error> {
    let app = &ctx.data().app;
    let args = match parse_batch_args(args.as_deref().unwrap_or_default()) {
        Ok(args) => args,
        Err(e) => {
            ctx.say(format!("❌ {}\n{}", e, BATCH_USAGE)).await?;
            return Ok(());
        }
    };

    let explicit = match args.action {
        BatchAction::List => {
            let servers = app.db.list_servers().await?;
            let reply = if servers.is_empty() {
                "📋 No saved servers. Add one with `/batch-query add <address>`".to_string()
            } else {
                let rows: Vec<String> = servers
                    .iter()
                    .map(|s| format!("{}. {}", s.index, s.address))
                    .collect();
                format!("📋 Saved servers ({}):\n{}", servers.len(), rows.join("\n"))
            };
            ctx.say(reply).await?;
            return Ok(());
        }
        BatchAction::Add(input) => {
            let address = match parse_address(&input) {
                Ok(address) => address,
                Err(e) => {
                    ctx.say(e.user_message()).await?;
                    return Ok(());
                }
            };
            match app.db.add_server(address.to_string()).await {
                Ok(saved) => {
                    app.reload_schedule_lists().await?;
                    ctx.say(format!("✅ Saved {} as #{}", saved.address, saved.index))
                        .await?;
                }
                Err(DbError::ServerAlreadySaved(address)) => {
                    ctx.say(format!("ℹ️ {} is already saved", address)).await?;
                }
                Err(e) => return Err(e.into()),
            }
            return Ok(());
        }
        BatchAction::Remove(position) => {
            match app.db.remove_server_at(position).await {
                Ok(removed) => {
                    app.reload_schedule_lists().await?;
                    ctx.say(format!("🗑️ Removed {}", removed.address)).await?;
                }
                Err(DbError::ServerNotFound(index)) => {
                    ctx.say(format!("❌ No saved server at position {}", index))
                        .await?;
                }
                Err(e) => return Err(e.into()),
            }
            return Ok(());
        }
        BatchAction::Clear => {
            let removed = app.db.clear_servers().await?;
            app.reload_schedule_lists().await?;
            ctx.say(format!("🗑️ Removed {} saved server(s)", removed))
                .await?;
            return Ok(());
        }
        BatchAction::Query(addresses) => addresses,
    };

    let selection = app.select_batch(explicit).await?;
    if selection.addresses.is_empty() {
        ctx.say("❌ No servers to query. Pass addresses or save some with `/batch-query add <address>`")
            .await?;
        return Ok(());
    }

    ctx.defer().await?;
    if let Some(total) = selection.truncated_from {
        ctx.say(format!(
            "⚠️ {} addresses given, only the first {} are queried",
            total,
            selection.addresses.len()
        ))
        .await?;
    }

    let report = app.queries.query_batch(&selection.addresses).await;
    let image = prefers_image(args.image, args.text, app.config.generate_image);
    send_payload(ctx, app.batch_payload(&report, image)).await
}

/// Manage scheduled status broadcasts
#[command(
    slash_command,
    prefix_command,
    required_permissions = "ADMINISTRATOR",
    subcommands(
        "schedule_status",
        "schedule_start",
        "schedule_stop",
        "schedule_test",
        "schedule_run",
        "add_group",
        "remove_group",
        "list_groups"
    ),
    subcommand_required
)]
pub async fn schedule(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show the schedule configuration
#[command(slash_command, prefix_command, rename = "status")]
pub async fn schedule_status(ctx: Context<'_>) -> Result<(), Error> {
    let app = &ctx.data().app;
    let settings = app.scheduler.settings();
    let state = match (settings.enabled, app.scheduler.is_running()) {
        (true, true) => "🟢 running",
        (true, false) => "🟡 enabled, timer not running",
        (false, _) => "🔴 stopped",
    };
    ctx.say(format!(
        "📅 Schedule: {}\nInterval: every {} minutes\nWindow: {}\nChannels: {}\nServers: {}\nFormat: {}",
        state,
        settings.interval.as_secs() / 60,
        settings.window,
        settings.targets.len(),
        settings.addresses.len(),
        if settings.image { "image" } else { "text" },
    ))
    .await?;
    Ok(())
}

/// Start scheduled broadcasts
#[command(slash_command, prefix_command, rename = "start")]
pub async fn schedule_start(ctx: Context<'_>) -> Result<(), Error> {
    let app = &ctx.data().app;
    app.set_schedule_enabled(true).await?;
    if !app.scheduler.start() {
        ctx.say("❌ The schedule could not start, check SCHEDULE_INTERVAL_MIN")
            .await?;
        return Ok(());
    }

    let settings = app.scheduler.settings();
    let mut reply = format!(
        "✅ Schedule started: every {} minutes between {}",
        settings.interval.as_secs() / 60,
        settings.window
    );
    if settings.targets.is_empty() {
        reply.push_str("\n⚠️ No channels yet, add one with `/schedule add-group`");
    }
    if settings.addresses.is_empty() {
        reply.push_str("\n⚠️ No saved servers yet, add one with `/batch-query add <address>`");
    }
    ctx.say(reply).await?;
    Ok(())
}

/// Stop scheduled broadcasts
#[command(slash_command, prefix_command, rename = "stop")]
pub async fn schedule_stop(ctx: Context<'_>) -> Result<(), Error> {
    let app = &ctx.data().app;
    app.set_schedule_enabled(false).await?;
    let reply = if app.scheduler.stop() {
        "⏹️ Schedule stopped"
    } else {
        "ℹ️ The schedule was not running"
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Preview the scheduled message here without broadcasting it
#[command(slash_command, prefix_command, rename = "test")]
pub async fn schedule_test(ctx: Context<'_>) -> Result<(), Error> {
    let app = &ctx.data().app;
    ctx.defer().await?;
    match app.scheduler.preview().await {
        Some(payload) => send_payload(ctx, payload).await,
        None => {
            ctx.say("❌ No saved servers to report on").await?;
            Ok(())
        }
    }
}

/// Broadcast to every channel now, ignoring the time window
#[command(slash_command, prefix_command, rename = "run")]
pub async fn schedule_run(ctx: Context<'_>) -> Result<(), Error> {
    let app = &ctx.data().app;
    ctx.defer().await?;
    let reply = match app.scheduler.run_now().await {
        TickOutcome::Broadcast { delivered, failed } if failed == 0 => {
            format!("📣 Sent to {} channel(s)", delivered)
        }
        TickOutcome::Broadcast { delivered, failed } => {
            format!("📣 Sent to {} channel(s), {} failed", delivered, failed)
        }
        TickOutcome::Skipped(SkipReason::NoTargets) => "❌ No broadcast channels configured".to_string(),
        TickOutcome::Skipped(SkipReason::NoAddresses) => "❌ No saved servers to report on".to_string(),
        TickOutcome::Skipped(reason) => format!("ℹ️ Nothing sent ({:?})", reason),
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Channel id from an optional argument, defaulting to the invoking channel.
/// Accepts a raw id or a `<#id>` mention.
fn resolve_channel(ctx: Context<'_>, channel: Option<&str>) -> Option<u64> {
    match channel {
        None => Some(ctx.channel_id().get()),
        Some(raw) => raw
            .trim()
            .trim_start_matches("<#")
            .trim_end_matches('>')
            .parse::<u64>()
            .ok()
            .filter(|id| *id != 0),
    }
}

/// Add a channel to the broadcast list
#[command(slash_command, prefix_command, rename = "add-group")]
pub async fn add_group(
    ctx: Context<'_>,
    #[description = "Channel id (default: this channel)"] channel: Option<String>,
) -> Result<(), Error> {
    let app = &ctx.data().app;
    let Some(channel_id) = resolve_channel(ctx, channel.as_deref()) else {
        ctx.say(format!("❌ `{}` is not a channel id", channel.unwrap_or_default()))
            .await?;
        return Ok(());
    };

    let reply = if app.db.add_target(channel_id, now()).await? {
        app.reload_schedule_lists().await?;
        format!("✅ <#{}> will receive scheduled status", channel_id)
    } else {
        format!("ℹ️ <#{}> is already on the list", channel_id)
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Remove a channel from the broadcast list
#[command(slash_command, prefix_command, rename = "remove-group")]
pub async fn remove_group(
    ctx: Context<'_>,
    #[description = "Channel id (default: this channel)"] channel: Option<String>,
) -> Result<(), Error> {
    let app = &ctx.data().app;
    let Some(channel_id) = resolve_channel(ctx, channel.as_deref()) else {
        ctx.say(format!("❌ `{}` is not a channel id", channel.unwrap_or_default()))
            .await?;
        return Ok(());
    };

    let reply = if app.db.remove_target(channel_id).await? {
        app.reload_schedule_lists().await?;
        format!("🗑️ <#{}> removed from the broadcast list", channel_id)
    } else {
        format!("ℹ️ <#{}> was not on the list", channel_id)
    };
    ctx.say(reply).await?;
    Ok(())
}

/// List broadcast channels
#[command(slash_command, prefix_command, rename = "list-groups")]
pub async fn list_groups(ctx: Context<'_>) -> Result<(), Error> {
    let targets = ctx.data().app.db.list_targets().await?;
    let reply = if targets.is_empty() {
        "📭 No broadcast channels configured".to_string()
    } else {
        let rows: Vec<String> = targets
            .iter()
            .map(|t| format!("- <#{}>", t.channel_id))
            .collect();
        format!("📬 Broadcast channels ({}):\n{}", targets.len(), rows.join("\n"))
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Show bot health and cache statistics
#[command(slash_command, prefix_command)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let report = ctx.data().app.status_report().await?;
    ctx.say(report.to_text()).await?;
    Ok(())
}

/// Show the available commands
#[command(slash_command, prefix_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say(
        "**Server status bot**\n\
        `/query <address>` live status of one server (`image`, `text`, `clear` options)\n\
        `/batch-query [addresses...] [image|text]` status of up to 10 servers, defaults to the saved list\n\
        `/batch-query list|add <address>|remove <n>|clear` manage the saved list\n\
        `/schedule status|start|stop|test|run` scheduled broadcasts\n\
        `/schedule add-group|remove-group|list-groups` broadcast channels\n\
        `/status` bot health\n\
        Addresses: `host`, `host:port` or `[ipv6]:port`, default port 27015",
    )
    .await?;
    Ok(())
}
