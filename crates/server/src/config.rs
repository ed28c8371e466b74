use skirmish::DEFAULT_TICK_RATE;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tick_rate: u32,
    pub max_peers: usize,
    /// Broadcast every Nth tick. 1 sends a snapshot per tick; 0 is
    /// treated as 1.
    pub snapshot_interval: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            max_peers: 16,
            snapshot_interval: 1,
        }
    }
}
