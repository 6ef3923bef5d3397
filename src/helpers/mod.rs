pub mod command_def;
pub mod command_opt;
pub mod command_perm;
pub mod command_resp;
