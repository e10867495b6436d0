use std::collections::HashSet;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A barrier for the systems of one stage.
///
/// Each member system calls [`arrive`](Self::arrive) with its name once per dispatch,
/// and is blocked until every other member of the stage has arrived in the same round.
/// If the executor runs the members one after another,
/// the first member never sees the others and the round times out.
#[derive(Debug)]
pub struct StageRendezvous {
    members: Vec<String>,
    timeout: Duration,
    state:   Mutex<RendezvousState>,
    condvar: Condvar,
}

#[derive(Debug, Default)]
struct RendezvousState {
    arrived: Vec<String>,
    rounds:  usize,
    /// Worker indices of the arriving threads; `None` for threads outside any pool.
    threads: HashSet<Option<usize>>,
}

impl StageRendezvous {
    /// Creates a rendezvous for the named systems.
    pub fn new(members: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            members: members.into_iter().map(Into::into).collect(),
            timeout: Duration::from_secs(5),
            state:   Mutex::default(),
            condvar: Condvar::new(),
        }
    }

    /// Blocks until all members arrived in the current round.
    ///
    /// # Panics
    /// Panics if `system` is not a member, arrives twice in a round,
    /// or the other members do not arrive before the timeout.
    pub fn arrive(&self, system: &str) {
        let mut state = self.state.lock();
        assert!(
            self.members.iter().any(|member| member == system),
            "{system} is not a member of the rendezvous {:?}",
            self.members
        );
        assert!(
            !state.arrived.iter().any(|arrived| arrived == system),
            "{system} arrived twice in round {}",
            state.rounds
        );

        state.arrived.push(system.to_string());
        state.threads.insert(rayon::current_thread_index());
        log::trace!("{system} arrived in round {} ({:?})", state.rounds, state.arrived);

        if state.arrived.len() == self.members.len() {
            state.arrived.clear();
            state.rounds += 1;
            self.condvar.notify_all();
            return;
        }

        let round = state.rounds;
        let deadline = Instant::now() + self.timeout;
        while state.rounds == round {
            let timed_out = self.condvar.wait_until(&mut state, deadline).timed_out();
            if timed_out && state.rounds == round {
                panic!(
                    "Round {round} timed out with only {:?} of {:?} arrived; did the stage run \
                     serially?",
                    state.arrived, self.members
                );
            }
        }
    }

    /// The number of completed rounds.
    pub fn rounds(&self) -> usize { self.state.lock().rounds }

    /// The number of distinct threads that arrived across all rounds.
    pub fn thread_count(&self) -> usize { self.state.lock().threads.len() }
}
