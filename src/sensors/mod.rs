//! I²C sensors: the four ADS1115 loop-current converters and the UPS
//! monitor, plus the sampler tasks that drive them.

pub mod ads1115;
pub mod analog;
pub mod ina219;
pub mod ups;

pub use analog::{AnalogSampler, AnalogTiming};
pub use ups::{UpsSampler, UpsTiming};
