use tracing::{info, instrument};

use crate::config::Config;
use crate::error::TrackerError;
use crate::torrent::TorrentMetadata;
use crate::tracker::{Peer, Request, Response};

/// Announce to the tracker once and return the peers it reports
///
/// Runs to completion before any peer session starts; a failure here leaves nothing to
/// connect to.
#[instrument(skip_all, fields(tracker = %metadata.announce))]
pub async fn discover_peers(
    metadata: &TorrentMetadata,
    config: &Config,
) -> Result<Vec<Peer>, TrackerError> {
    let request = Request::new(
        &metadata.announce,
        &config.peer_id,
        config.port,
        &metadata.info_hash,
        metadata.total_length,
    )?;
    let client = reqwest::Client::builder()
        .timeout(config.tracker_timeout)
        .build()?;
    let data = request.send(&client).await?;
    let response = Response::deserialise(&data)?;
    if let Response::Success {
        interval,
        min_interval,
        ref peers,
    } = response
    {
        info!(
            "Tracker returned {} peers (interval {}s, min interval {:?})",
            peers.len(),
            interval,
            min_interval
        );
    }
    response.into_peers()
}
