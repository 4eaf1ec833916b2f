pub mod backend;
pub mod drives;
pub mod error;
pub mod gateway;
pub mod handle;
pub mod ioctl;
pub mod joystick;
pub mod legacy;
pub mod stream;
pub mod test_utils;
pub mod text;

pub use backend::{AccessMode, DeviceBackend, OpenFlags, OsResult};
pub use drives::{DiskInfo, Drive, DriveLetters, MediaFilter, NetDrive};
pub use error::{GatewayError, Result, ResultCode};
pub use gateway::{Gateway, OpenRequest, TransferRange, LIB_VERSION};
pub use handle::DeviceHandle;
pub use ioctl::{
    DiskGeometry, DiskGeometryEx, DriveLayout, HotplugInfo, PartitionInfo, PartitionStyle,
    StorageDeviceInfo,
};
pub use joystick::{Joystick, JoystickBounds, JoystickPos, JoystickState};
pub use legacy::LegacyGateway;
pub use stream::{DeviceFile, DeviceReader, DeviceWriter, RandomAccessDevice};

/// Environment variable holding the `env_logger` filter of the native
/// library and the CLI.
pub const LOG_ENV: &str = "DEVGATE_LOG";
