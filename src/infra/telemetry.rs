use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter,
    filter::Directive,
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Applied unless `RUST_LOG` is set, which replaces the whole filter.
const QUIET_DIRECTIVES: &[&str] = &["sqlx=warn", "tower_http=warn", "hyper=warn"];

/// Install the process-wide subscriber and describe the page metrics.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let filter = build_filter(logging)?;
    let output = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_thread_ids(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default())
        .with(output)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("subscriber already installed: {err}")))
}

fn build_filter(logging: &LoggingSettings) -> Result<EnvFilter, InfraError> {
    if let Ok(spec) = std::env::var(EnvFilter::DEFAULT_ENV)
        && !spec.trim().is_empty()
    {
        return EnvFilter::try_new(&spec).map_err(|err| {
            InfraError::telemetry(format!("invalid {}: {err}", EnvFilter::DEFAULT_ENV))
        });
    }

    let mut filter = EnvFilter::default().add_directive(logging.level.into());
    for spec in QUIET_DIRECTIVES {
        let directive = spec
            .parse::<Directive>()
            .map_err(|err| InfraError::telemetry(format!("bad directive `{spec}`: {err}")))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "opaline_cache_hit_total",
            Unit::Count,
            "Page reads answered from the snapshot cache."
        );
        describe_counter!(
            "opaline_cache_miss_total",
            Unit::Count,
            "Page reads that fell through to the store."
        );
        describe_counter!(
            "opaline_cache_corrupt_total",
            Unit::Count,
            "Cached snapshots discarded because they failed to decode."
        );
        describe_counter!(
            "opaline_cache_invalidate_total",
            Unit::Count,
            "Cache keys removed after a committed write."
        );
        describe_counter!(
            "opaline_cache_evict_total",
            Unit::Count,
            "Snapshots pushed out of the in-process cache by capacity."
        );
        describe_counter!(
            "opaline_page_view_total",
            Unit::Count,
            "Views recorded against public pages."
        );
    });
}
