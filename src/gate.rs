//! Decryption gate: the authorization half of the two-phase reveal

use tracing::{debug, info};

use crate::error::{ReferendumError, Result};
use crate::registry::{Event, Referendum};
use crate::types::Address;

impl Referendum {
    /// Mark both tallies of a closed proposal as publicly decryptable.
    ///
    /// Anyone may call this once `now >= end_time`. The first successful call
    /// flips `decryption_authorized` and emits `DecryptionReady`; later calls
    /// succeed without changing anything.
    pub fn allow_decryption(&mut self, caller: Address, id: u64) -> Result<()> {
        let proposal = self.proposals.get(&id).ok_or(ReferendumError::NotFound)?;
        if self.now() < proposal.end_time {
            return Err(ReferendumError::VotingNotEnded);
        }
        if proposal.decryption_authorized {
            debug!(id, %caller, "decryption already authorized");
            return Ok(());
        }

        let (yes_handle, no_handle) = (proposal.yes_handle, proposal.no_handle);
        self.coprocessor
            .make_all_publicly_decryptable(self.address, &[yes_handle, no_handle])?;

        if let Some(proposal) = self.proposals.get_mut(&id) {
            proposal.decryption_authorized = true;
        }

        info!(id, %caller, %yes_handle, %no_handle, "decryption authorized");
        self.emit(Event::DecryptionReady {
            id,
            yes_handle,
            no_handle,
        });

        Ok(())
    }
}
