//! Command-line entry point: answers one question through the full pipeline.
//!
//! Stand-in for the chat transport during development and operations:
//!
//! ```text
//! answer-cli <user_id> <chat|country> <question...>
//! answer-cli boost <user_id>
//! ```

use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pipeline::{AnswerPipeline, HttpLlmClient, RetryPolicy};
use shared::{AnswerRequest, AssistantStore, Config, Mode, PgStore};

/// History items handed to the pipeline in chat mode.
const HISTORY_LIMIT: i64 = 6;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let config = Config::from_env().context("configuration incomplete")?;

    let pool = shared::db::create_pool(&config.database_url)
        .await
        .context("could not connect to database")?;
    let store = Arc::new(PgStore::new(pool));
    store.init_schema().await.context("schema init failed")?;
    store
        .sweep_country_cache(config.cache.ttl_days)
        .await
        .context("cache sweep failed")?;

    // Admin path: extend a user's boost window.
    if args.first().map(String::as_str) == Some("boost") {
        let Some(raw_id) = args.get(1) else {
            bail!("usage: answer-cli boost <user_id>");
        };
        let user_id: i64 = raw_id.parse().context("user_id must be an integer")?;
        store.ensure_user(user_id, None).await?;
        let until = store.extend_boost(user_id, config.limits.boost_days).await?;
        println!("boost extended until {}", until);
        return Ok(());
    }

    if args.len() < 3 {
        bail!("usage: answer-cli <user_id> <chat|country> <question...>");
    }
    let user_id: i64 = args[0].parse().context("user_id must be an integer")?;
    let mode: Mode = args[1]
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let question = args[2..].join(" ");

    let search = Arc::new(
        HttpLlmClient::new(
            config.search_api_url.as_str(),
            config.search_api_key.clone(),
            config.search_model.as_str(),
        )
        .with_retry(RetryPolicy::standard()),
    );
    let format = Arc::new(HttpLlmClient::new(
        config.format_api_url.as_str(),
        config.format_api_key.clone(),
        config.format_model.as_str(),
    ));

    let pipeline = AnswerPipeline::new(
        store.clone(),
        search,
        format,
        config.limits.clone(),
        config.cache.clone(),
    );

    store.ensure_user(user_id, None).await?;

    let (profile, history) = if mode == Mode::Chat {
        (
            store.get_user_profile(user_id).await?,
            store.recent_messages(user_id, HISTORY_LIMIT).await?,
        )
    } else {
        (None, Vec::new())
    };

    let request = AnswerRequest::new(user_id, question, mode)
        .with_profile(profile)
        .with_history(history);

    info!(user_id, mode = mode.as_str(), "Generating answer");
    let answer = pipeline.generate_answer(&request).await;

    println!("{}", answer);

    Ok(())
}
