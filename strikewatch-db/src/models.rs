/// A server address kept in the persistent batch list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedServer {
  /// 1-based position in list order, as shown to users
  pub index: usize,
  /// Address exactly as the user entered it (e.g. "1.2.3.4:27015")
  pub address: String,
}

/// A Discord channel that receives scheduled status broadcasts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleTarget {
  /// Discord channel ID
  pub channel_id: u64,
  /// Unix timestamp when the channel was added
  pub added_at: i64,
}
