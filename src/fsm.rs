//! The external FSM collaborator (spec §1, §4.2, §4.9).
//!
//! The kernel has no top-level state machine of its own: it inspects the
//! FSM's substate to decide when a transition or multi-port command is
//! complete, and calls back into it once it is. This trait is the seam;
//! a real component provides the implementation, the way a real I/O
//! resource provides `Evented` to the teacher's `Poll`.

use crate::error::KernelError;
use crate::ids::PortTarget;
use crate::queue::CommandKind;

/// The five top-level states of spec §1/§4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Loaded,
    WaitForResources,
    Idle,
    Executing,
    Pause,
}

/// The steady + transient substates the kernel inspects (spec §4.9). Only
/// the FSM owns which one currently applies; the kernel never advances it
/// directly, it only asks for it and calls `complete_transition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Substate {
    Loaded,
    LoadedToIdle,
    Idle,
    IdleToLoaded,
    Executing,
    ExecutingToIdle,
    Pause,
    PauseToIdle,
    WaitForResources,
}

impl Substate {
    /// The steady state this substate belongs to, if any (a `*ToIdle`
    /// substate has no single steady-state reading until it resolves).
    pub fn steady_state(self) -> Option<State> {
        match self {
            Substate::Loaded => Some(State::Loaded),
            Substate::Idle => Some(State::Idle),
            Substate::Executing => Some(State::Executing),
            Substate::Pause => Some(State::Pause),
            Substate::WaitForResources => Some(State::WaitForResources),
            Substate::LoadedToIdle
            | Substate::IdleToLoaded
            | Substate::ExecutingToIdle
            | Substate::PauseToIdle => None,
        }
    }

    pub fn is_executing_to_idle_or_pause_to_idle(self) -> bool {
        matches!(self, Substate::ExecutingToIdle | Substate::PauseToIdle)
    }
}

/// The collaborator that owns top-level state and is notified of
/// transition/command completion (spec §6).
pub trait Fsm {
    fn substate(&self) -> Substate;

    /// Called once a `StateSet` transition's completion condition holds
    /// (spec §4.2's `done?` column).
    fn complete_transition(&mut self, target: State, error: Option<KernelError>);

    /// Called when a multi-port command's `cmd_completion_count` reaches
    /// zero (spec §4.3). Per spec §9's Open Question, `MarkBuffer`
    /// completion never reaches this method.
    fn complete_command(&mut self, cmd: CommandKind, port: PortTarget, error: Option<KernelError>);
}
