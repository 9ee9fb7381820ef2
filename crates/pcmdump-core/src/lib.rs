//! pcmdump-core: GM VPW PCM read-out client.
//!
//! This crate implements the host side of the SAE J1850 VPW diagnostic
//! dialect spoken by GM powertrain control modules: property queries,
//! seed/key unlock, 1x/4x bus speed negotiation, kernel upload into PCM RAM
//! and the kernel-served flash image read-out.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: constants, message framing, factory, parsers
//! - **Device**: pass-through adapter abstraction (trait + mock)
//! - **Events**: observer pattern for UI decoupling
//! - **Vehicle**: high-level protocol engine
//! - **Kernel**: upload block planning
//! - **Key**: seed-to-key derivation seam
//!
//! The physical adapter driver is not part of this crate; anything that can
//! move one framed VPW message each way can implement [`Device`].
//!
//! # Example
//!
//! ```no_run
//! use pcmdump_core::{CancellationToken, PcmInfo, SeedComplement, Vehicle};
//! # fn open_adapter() -> pcmdump_core::MockDevice { pcmdump_core::MockDevice::new() }
//!
//! let mut vehicle = Vehicle::new(open_adapter());
//! vehicle.initialize().expect("adapter init");
//!
//! let info = PcmInfo {
//!     image_base_address: 0x00_0000,
//!     image_size: 512 * 1024,
//!     key_algorithm_id: 40,
//! };
//! let kernel = std::fs::read("kernel.bin").expect("kernel binary");
//!
//! vehicle.unlock(info.key_algorithm_id, &SeedComplement);
//! let image = vehicle.read_contents(&info, &kernel, &CancellationToken::new());
//! ```

pub mod cancel;
pub mod device;
pub mod events;
pub mod kernel;
pub mod key;
pub mod protocol;
pub mod vehicle;

// Re-exports for convenience
pub use cancel::CancellationToken;
pub use device::{Device, DeviceError, MockDevice, TimeoutScenario, VpwSpeed};
pub use events::{NullObserver, Phase, TracingObserver, VehicleEvent, VehicleObserver};
pub use key::{KeyAlgorithm, SeedComplement};
pub use protocol::{Message, Response, ResponseStatus};
pub use vehicle::{BusSpeed, PcmInfo, Vehicle, VehicleConfig};
