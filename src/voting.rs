//! Vote casting: precondition checks and the oblivious tally update

use tracing::info;

use crate::error::{ReferendumError, Result};
use crate::registry::{Event, Referendum};
use crate::types::{Address, CiphertextHandle};

impl Referendum {
    /// Cast `caller`'s encrypted yes/no ballot on proposal `id`.
    ///
    /// Checks, in order: the proposal exists, voting is still open, the caller
    /// has not voted, and the input proof is valid for this contract and
    /// caller. The tallies are then updated with
    ///
    /// ```text
    /// yes += select(ballot, 1, 0)
    /// no  += select(ballot, 0, 1)
    /// ```
    ///
    /// Both selections and both additions always run; the ballot is never
    /// decrypted. Tallies, the voter flag and the event are committed
    /// together after every fallible step has succeeded.
    pub fn vote(
        &mut self,
        caller: Address,
        id: u64,
        ballot: CiphertextHandle,
        input_proof: &[u8],
    ) -> Result<()> {
        let (yes, no) = {
            let proposal = self.proposals.get(&id).ok_or(ReferendumError::NotFound)?;
            if self.now() >= proposal.end_time {
                return Err(ReferendumError::VotingEnded);
            }
            (proposal.yes_handle, proposal.no_handle)
        };
        if self.has_voted.contains(&(id, caller)) {
            return Err(ReferendumError::AlreadyVoted);
        }

        let contract = self.address;
        let coprocessor = &self.coprocessor;
        let is_yes = coprocessor.verify_input(contract, caller, ballot, input_proof)?;

        let yes_increment = coprocessor.select_constant(contract, &is_yes, 1, 0)?;
        let no_increment = coprocessor.select_constant(contract, &is_yes, 0, 1)?;
        let new_yes = coprocessor.add(contract, &yes, &yes_increment)?;
        let new_no = coprocessor.add(contract, &no, &no_increment)?;

        let proposal = self.proposals.get_mut(&id).ok_or(ReferendumError::NotFound)?;
        proposal.yes_handle = new_yes;
        proposal.no_handle = new_no;
        self.has_voted.insert((id, caller));

        info!(id, voter = %caller, "vote cast");
        self.emit(Event::VoteCast { id, voter: caller });

        Ok(())
    }
}
