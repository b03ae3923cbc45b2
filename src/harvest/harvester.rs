// src/harvest/harvester.rs

//! Walks the workload's result server and downloads every file it lists.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::ClusterApi;
use crate::errors::{HarvestError, RunnerError};
use crate::harvest::listing::parse_listing;
use crate::harvest::results::ResultSet;
use crate::wait::{Attempt, PollPolicy, ServiceEndpoint, poll_until};

pub const LISTING_POLL: Duration = Duration::from_secs(5);
pub const LISTING_TIMEOUT: Duration = Duration::from_secs(60);

/// Download the full result tree behind `service`.
///
/// The root listing is retried until the server answers. After that every
/// request is attempted once: a failed download or sub-listing fetch aborts
/// with no results, while a truncated listing is reported together with
/// everything that could be enumerated.
pub async fn harvest(
    cluster: &dyn ClusterApi,
    service: &ServiceEndpoint,
    cancel: &CancellationToken,
) -> Result<ResultSet, HarvestError> {
    let root = poll_until(
        PollPolicy::immediate(LISTING_POLL, LISTING_TIMEOUT),
        cancel,
        &format!("result listing of service {}", service.name),
        || async move {
            match fetch(cluster, service, "").await {
                Ok(body) => Ok(Attempt::Done(body)),
                Err(e) => Ok(Attempt::Pending(e.to_string())),
            }
        },
    )
    .await?;

    let mut results = ResultSet::new();
    let mut malformed: Option<RunnerError> = None;
    let mut dirs: Vec<(String, Vec<u8>)> = vec![(String::new(), root)];
    let mut visited = BTreeSet::from([String::new()]);

    while let Some((dir, body)) = dirs.pop() {
        let listing = parse_listing(&String::from_utf8_lossy(&body));
        if let Some(reason) = listing.error {
            warn!(path = %format!("/{dir}"), %reason, "result listing is truncated");
            malformed.get_or_insert(RunnerError::MalformedListing {
                path: dir.clone(),
                reason,
            });
        }

        for link in listing.links {
            if cancel.is_cancelled() {
                return Err(RunnerError::Cancelled.into());
            }

            let path = format!("{dir}{link}");
            if path.ends_with('/') && !visited.insert(path.clone()) {
                debug!(%path, "skipping result directory already listed");
                continue;
            }

            let contents = fetch(cluster, service, &path)
                .await
                .map_err(|e| RunnerError::Download {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;

            if path.ends_with('/') {
                debug!(%path, "descending into result directory");
                dirs.push((path, contents));
            } else {
                debug!(%path, bytes = contents.len(), "downloaded result");
                results.insert(path, contents);
            }
        }
    }

    match malformed {
        Some(err) => Err(HarvestError::with_partial(results, err)),
        None => {
            info!(service = %service.name, files = results.len(), "retrieved results");
            Ok(results)
        }
    }
}

async fn fetch(
    cluster: &dyn ClusterApi,
    service: &ServiceEndpoint,
    path: &str,
) -> crate::errors::Result<Vec<u8>> {
    cluster
        .proxy_get(&service.namespace, &service.name, service.port, path)
        .await
}
