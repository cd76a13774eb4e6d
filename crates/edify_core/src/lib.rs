pub mod error;
pub mod wrap;
pub mod script;
pub mod setup;
pub mod fstab;
pub mod generator;
pub mod profile;
pub mod package;

pub use error::{EdifyError, Result};
pub use script::Script;
pub use setup::SetupStep;
pub use fstab::{Fstab, FstabEntry, PartitionType};
pub use generator::{EdifyGenerator, LegacyMount};
pub use profile::DeviceProfile;
pub use package::{stage_setup_files, write_package, PackageFile};
