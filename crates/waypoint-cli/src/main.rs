mod cli;
mod telemetry;

use anyhow::{bail, Context};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use waypoint_admission::{
    Admission, AdmissionController, FixedWindowSettings, RedisWindowCounter, TokenBucketSettings,
};
use waypoint_cache::{MokaLinkCache, RedisLinkCache};
use waypoint_core::{DurableStore, Link, LinkCache, ShortCode};
use waypoint_generator::RandomGenerator;
use waypoint_shortener::{ErrorKind, HybridRepository, LinkService, PruneJob};
use waypoint_storage::{InMemoryStore, PostgresStore};

use crate::cli::{AdmissionArg, Cli, Command, LimitArgs};

type Service =
    LinkService<HybridRepository<Arc<dyn DurableStore>, Arc<dyn LinkCache>>, RandomGenerator>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_format)?;

    let store = durable_store(cli.database_url.as_deref()).await?;

    match cli.command {
        Command::Shorten {
            ref url,
            ref owner,
            ref origin,
            ref base_url,
            json,
        } => {
            let admission = admission(&cli).await?;
            let decision = admission.admit(origin).await;
            admission.shutdown().await;
            if let Err(rejection) = decision {
                bail!("request rejected ({}): {rejection}", rejection.status_code());
            }

            let service = service(&cli, store).await?;
            let link = service
                .shorten(url, owner)
                .await
                .with_context(|| format!("failed to shorten {url}"))?;
            print_link(&link, Some(base_url.as_str()), json)?;
        }
        Command::Resolve { ref code, json } => {
            let code = ShortCode::new(code.as_str())?;
            let service = service(&cli, store).await?;
            match service.get(&code).await {
                Ok(link) => print_link(&link, None, json)?,
                Err(e) if e.kind() == ErrorKind::NotFound => bail!("no link for code {code}"),
                Err(e) => return Err(e).context("failed to resolve link"),
            }
        }
        Command::Prune {
            max_age_secs,
            interval_secs,
            once,
        } => {
            let job = PruneJob::new(
                store,
                Duration::from_secs(interval_secs),
                Duration::from_secs(max_age_secs),
            );
            if once {
                let outcome = job.run_once().await.context("prune failed")?;
                info!(removed = outcome.removed, "prune finished");
            } else {
                let passes = job.run(shutdown_signal()).await;
                info!(passes, "prune job exited");
            }
        }
    }

    Ok(())
}

async fn durable_store(database_url: Option<&str>) -> anyhow::Result<Arc<dyn DurableStore>> {
    match database_url {
        Some(url) => {
            let store = PostgresStore::connect(url)
                .await
                .context("failed to connect to postgres")?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("no database url configured, permanent links are kept in memory");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

async fn link_cache(redis_url: Option<&str>) -> anyhow::Result<Arc<dyn LinkCache>> {
    match redis_url {
        Some(url) => {
            let cache = RedisLinkCache::connect(url)
                .await
                .context("failed to connect to redis")?;
            Ok(Arc::new(cache))
        }
        None => Ok(Arc::new(MokaLinkCache::default())),
    }
}

async fn service(cli: &Cli, store: Arc<dyn DurableStore>) -> anyhow::Result<Service> {
    let cache = link_cache(cli.redis_url.as_deref()).await?;
    let repository = HybridRepository::new(store, cache)
        .with_timeout(Duration::from_millis(cli.store_timeout_ms));
    Ok(LinkService::new(repository, RandomGenerator::default()))
}

async fn admission(cli: &Cli) -> anyhow::Result<Admission> {
    let limits: &LimitArgs = &cli.limits;
    info!(admission = %cli.admission, "configuring admission");

    match cli.admission {
        AdmissionArg::Local => Ok(Admission::local(
            TokenBucketSettings::builder()
                .global_rate(limits.global_rate)
                .global_burst(limits.global_burst)
                .origin_rate(limits.origin_rate)
                .origin_burst(limits.origin_burst)
                .idle_ttl(Duration::from_secs(limits.origin_idle_secs))
                .build(),
        )),
        AdmissionArg::Distributed => {
            let Some(url) = cli.redis_url.as_deref() else {
                bail!("distributed admission needs --redis-url");
            };
            let counter = RedisWindowCounter::connect(url)
                .await
                .context("failed to connect admission counter to redis")?;
            Ok(Admission::distributed(
                counter,
                FixedWindowSettings::builder()
                    .global_limit(limits.global_limit)
                    .origin_limit(limits.origin_limit)
                    .build(),
            ))
        }
    }
}

fn print_link(link: &Link, base_url: Option<&str>, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(link)?);
        return Ok(());
    }

    match base_url {
        Some(base) => println!("{}", link.code().to_url(base)),
        None => println!("{}", link.original_url()),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c, running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
