mod chart;
mod helpers;
mod init;
mod weight;

pub(crate) use chart::cmd_chart;
pub(crate) use helpers::NO_DATA_MESSAGE;
pub(crate) use init::cmd_init;
pub(crate) use weight::{cmd_delete, cmd_edit, cmd_log, cmd_show};
