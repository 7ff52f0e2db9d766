use thiserror::Error;

#[derive(Clone, Copy, Hash, Debug, PartialEq, Eq, PartialOrd, Ord, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<I2cError> {
    #[error("invalid response")]
    InvalidResponse,
    #[error("invalid CRC")]
    InvalidCrc,
    #[error("argument out of range")]
    InvalidArgument,
    #[error("periodic measurement is running")]
    PeriodicRunning,
    #[error("periodic measurement is not running")]
    NotPeriodic,
    #[error("unsupported device")]
    UnsupportedDevice,
    #[error("timed out waiting for the device")]
    Timeout,
    #[error("no measurement ready")]
    NotReady,
    #[error(transparent)]
    I2c(#[from] I2cError),
}

impl<E> embedded_hal::i2c::Error for Error<E>
where
    E: embedded_hal::i2c::Error,
{
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        match self {
            Self::I2c(err) => err.kind(),
            _ => embedded_hal::i2c::ErrorKind::Other,
        }
    }
}
