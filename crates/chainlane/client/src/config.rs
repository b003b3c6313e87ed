use chainlane_events::EventConfig;
use chainlane_fees::FeeConfig;
use chainlane_read::ReadConfig;
use chainlane_submit::SubmitConfig;
use chainlane_watch::WatchConfig;

/// Per-component settings for an [`InteractionClient`](crate::InteractionClient).
#[derive(Debug, Clone, Default, bon::Builder)]
pub struct ClientConfig {
    #[builder(default)]
    pub read: ReadConfig,
    #[builder(default)]
    pub fees: FeeConfig,
    #[builder(default)]
    pub submit: SubmitConfig,
    #[builder(default)]
    pub watch: WatchConfig,
    #[builder(default)]
    pub events: EventConfig,
}
