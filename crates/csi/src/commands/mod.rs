//! Command dispatch: bridges CLI args -> core orchestrator -> output formatting.

pub mod ipv6;
pub mod util;

use crate::cli::{CsmCommand, GlobalOpts, PatchCommand};
use crate::error::CliError;

/// Dispatch a `patch` subcommand to its handler.
pub async fn dispatch_patch(cmd: PatchCommand, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        PatchCommand::Csm(csm) => match csm.command {
            CsmCommand::Ipv6(args) => ipv6::handle(args, global).await,
        },
    }
}
