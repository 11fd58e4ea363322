mod build_cmd;
mod check_cmd;
mod validate_cmd;

pub use build_cmd::{cmd_build, BuildOptions};
pub use check_cmd::cmd_check;
pub use validate_cmd::cmd_validate;
