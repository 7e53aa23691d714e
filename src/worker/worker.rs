//! The BSP loop for one fragment.
//!
//! ```text
//! Uninitialized --init--> Ready --query--> PEval -> IncEval(1) -> ... -> Done
//!                           ^                                            |
//!                           +------------------ query -------------------+
//! ```
//!
//! A query is: barrier, fresh context, `Context::init`, then rounds of
//! `start_a_round` / (`peval` | `inc_eval`) / `finish_a_round` / vote until
//! the vote says stop, then a closing barrier and `finalize` of the message
//! manager.

use std::io::Write;
use std::sync::Arc;

use crate::app::{App, AppCheck, Context, ContextArgs, check_app_fragment_consistency};
use crate::bsp_error::BspError;
use crate::comm::communicator::Communicator;
use crate::fragment::Fragment;
use crate::message::manager::{MessageManager, Termination};
use crate::parallel::{ParallelEngine, ParallelEngineSpec};
use crate::worker::comm_spec::CommSpec;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Uninitialized,
    Ready,
    PEval,
    /// Running `inc_eval` of the given round.
    IncEval(u32),
    Done,
}

impl WorkerState {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerState::Uninitialized => "Uninitialized",
            WorkerState::Ready => "Ready",
            WorkerState::PEval => "PEval",
            WorkerState::IncEval(_) => "IncEval",
            WorkerState::Done => "Done",
        }
    }
}

/// Summary of a finished query on this fragment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryReport {
    /// `inc_eval` invocations; the last round index.
    pub rounds: u32,
    /// Records this fragment sent over the whole query.
    pub messages_sent: u64,
    pub termination: Option<Termination>,
}

pub struct Worker<A: App, C: Communicator> {
    app: Arc<A>,
    fragment: Arc<A::Fragment>,
    context: Option<A::Context>,
    messages: Option<MessageManager<A::Fragment, C>>,
    comm_spec: CommSpec,
    engine: ParallelEngine,
    state: WorkerState,
    round: u32,
}

impl<A: App, C: Communicator> Worker<A, C> {
    /// Pair `app` with `fragment`; fails if the fragment lacks edges the app needs.
    pub fn new(app: Arc<A>, fragment: Arc<A::Fragment>) -> Result<Self, BspError> {
        #[allow(clippy::let_unit_value)]
        let () = AppCheck::<A>::VALID;
        check_app_fragment_consistency::<A>(&fragment)?;
        Ok(Worker {
            app,
            fragment,
            context: None,
            messages: None,
            comm_spec: CommSpec::single(),
            engine: ParallelEngine::default(),
            state: WorkerState::Uninitialized,
            round: 0,
        })
    }

    fn ensure_state(&self, ok: bool, expected: &'static str) -> Result<(), BspError> {
        if ok {
            Ok(())
        } else {
            Err(BspError::InvalidState {
                expected,
                found: self.state.name(),
            })
        }
    }

    fn coordinator_log(&self, step: &str) {
        if self.comm_spec.is_coordinator() {
            log::debug!("[Coordinator]: Finished {step}");
        }
    }

    /// Prepare the fragment, bind the message manager to `comm` and build the
    /// thread pool.
    pub fn init(&mut self, comm: C, pe_spec: &ParallelEngineSpec) -> Result<(), BspError> {
        self.ensure_state(self.state == WorkerState::Uninitialized, "Uninitialized")?;
        self.fragment
            .prepare_to_run_app(A::MESSAGE_STRATEGY, A::NEED_SPLIT_EDGES)?;
        let comm_spec = CommSpec::from_comm(&comm);
        let messages = MessageManager::new(Arc::clone(&self.fragment), comm)?;
        self.engine = ParallelEngine::new(pe_spec)?;
        self.app.init_parallel_engine(&self.engine)?;
        self.app.init_communicator(&comm_spec)?;
        self.comm_spec = comm_spec;
        self.messages = Some(messages);
        self.state = WorkerState::Ready;
        self.coordinator_log("Init");
        Ok(())
    }

    /// Run one query to global termination.
    pub fn query(&mut self, args: ContextArgs<A>) -> Result<QueryReport, BspError> {
        self.ensure_state(
            matches!(self.state, WorkerState::Ready | WorkerState::Done),
            "Ready",
        )?;
        let Some(mut messages) = self.messages.take() else {
            return Err(BspError::InvalidState {
                expected: "Ready",
                found: self.state.name(),
            });
        };
        self.context = None;
        let result = self.run_query(&mut messages, args);
        messages.finalize();
        self.messages = Some(messages);
        match result {
            Ok((ctx, report)) => {
                self.context = Some(ctx);
                self.state = WorkerState::Done;
                Ok(report)
            }
            Err(e) => {
                self.state = WorkerState::Ready;
                Err(e)
            }
        }
    }

    fn run_query(
        &mut self,
        messages: &mut MessageManager<A::Fragment, C>,
        args: ContextArgs<A>,
    ) -> Result<(A::Context, QueryReport), BspError> {
        messages.barrier();
        let mut ctx = A::Context::new(Arc::clone(&self.fragment));
        ctx.init(messages, args)?;
        messages.start();

        self.round = 0;
        loop {
            messages.start_a_round();
            if self.round == 0 {
                self.state = WorkerState::PEval;
                self.app.peval(&self.fragment, &mut ctx, messages)?;
                self.coordinator_log("PEval");
            } else {
                self.state = WorkerState::IncEval(self.round);
                self.app.inc_eval(&self.fragment, &mut ctx, messages)?;
                self.coordinator_log(&format!("IncEval - {}", self.round));
            }
            messages.finish_a_round()?;
            if messages.to_terminate()? {
                break;
            }
            self.round += 1;
        }

        messages.barrier();
        let report = QueryReport {
            rounds: self.round,
            messages_sent: messages.messages_sent(),
            termination: messages.termination_info().cloned(),
        };
        log::debug!(
            "[frag {}] query finished after {} rounds, {} records sent",
            self.fragment.fid(),
            report.rounds,
            report.messages_sent
        );
        Ok((ctx, report))
    }

    /// Write this fragment's inner-vertex results.
    pub fn output<W: Write>(&self, sink: &mut W) -> Result<(), BspError> {
        self.ensure_state(self.state == WorkerState::Done, "Done")?;
        match &self.context {
            Some(ctx) => ctx.output(sink),
            None => Err(BspError::InvalidState {
                expected: "Done",
                found: self.state.name(),
            }),
        }
    }

    /// Context of the last successful query.
    pub fn get_context(&self) -> Option<&A::Context> {
        self.context.as_ref()
    }

    /// Drop the context and release the communicator; `init` may be called again.
    pub fn finalize(&mut self) {
        self.context = None;
        self.messages = None;
        self.state = WorkerState::Uninitialized;
        self.round = 0;
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Round of the running (or last) query.
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn comm_spec(&self) -> &CommSpec {
        &self.comm_spec
    }

    pub fn fragment(&self) -> &Arc<A::Fragment> {
        &self.fragment
    }

    pub fn app(&self) -> &Arc<A> {
        &self.app
    }

    pub fn parallel_engine(&self) -> &ParallelEngine {
        &self.engine
    }
}
