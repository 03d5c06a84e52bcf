mod archive;
mod fs_utils;
mod launch;
mod process;
mod swap;

pub use archive::{detect_archive_type, extract_archive, find_bundle, locate_bundle};
pub use fs_utils::{move_path, remove_path_if_exists};
pub use launch::{build_launch_command, launch_bundle};
pub use process::{is_process_running, wait_for_exit, wait_for_exit_with_probe};
pub use swap::{backup_path_for, replace_bundle, replace_bundle_with_mover, SwapStep};
