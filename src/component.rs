/// Common lifecycle of every unit driver.
pub trait Component {
    type Error;

    const NAME: &'static str;
    const DEFAULT_ADDRESS: u8;

    fn address(&self) -> u8;

    /// Detects the device, applies the configuration and starts periodic
    /// measurement if configured to.
    fn begin(&mut self) -> Result<(), Self::Error>;

    /// Polls the device once. `now_ms` is a monotonic timestamp in
    /// milliseconds; `force` ignores the measurement interval. Returns
    /// whether a new measurement was stored.
    fn update(&mut self, now_ms: u64, force: bool) -> Result<bool, Self::Error>;
}
