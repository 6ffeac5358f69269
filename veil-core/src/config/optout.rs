//! Opt-out sources: marker column values and PID/MPID list files.

use serde::{Deserialize, Serialize};

/// Where standing withdrawals come from, beyond the admin tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OptOutOptions {
    /// Values of an `OPT_OUT`-flagged column that mark the row's patient as
    /// withdrawn (compared textually, e.g. `["1", "yes"]`).
    pub optout_col_values: Vec<String>,
    /// Files of PIDs to withdraw, one per line.
    pub optout_pid_filenames: Vec<String>,
    /// Files of MPIDs to withdraw, one per line.
    pub optout_mpid_filenames: Vec<String>,
}
