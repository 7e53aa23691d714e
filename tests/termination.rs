mod util;
use util::*;

use std::io::Write;
use std::sync::Arc;

use frag_bsp::app::write_inner_values;
use frag_bsp::prelude::*;

/// Records the round of every superstep it sees.
struct RoundLog<F: Fragment> {
    fragment: Arc<F>,
    seen: Vec<u32>,
}

impl<F: Fragment> Context<F> for RoundLog<F> {
    type Args = ();

    fn new(fragment: Arc<F>) -> Self {
        RoundLog {
            fragment,
            seen: Vec::new(),
        }
    }

    fn init<C: Communicator>(&mut self, _messages: &mut MessageManager<F, C>, _args: ()) -> Result<(), BspError> {
        Ok(())
    }

    fn output<W: Write>(&self, sink: &mut W) -> Result<(), BspError> {
        write_inner_values(&*self.fragment, sink, |_| self.seen.len())
    }
}

/// Scripted activity: fragment 0 sends a fragment message while
/// `round < send_until`, the last fragment votes to continue while
/// `round < continue_until`, and `stop_at` makes one fragment force
/// termination at a given round.
#[derive(Default)]
struct Scripted {
    send_until: u32,
    continue_until: u32,
    stop_at: Option<(Fid, u32)>,
}

impl Scripted {
    fn step<C: Communicator>(
        &self,
        frag: &EdgecutFragment,
        ctx: &mut RoundLog<EdgecutFragment>,
        messages: &mut MessageManager<EdgecutFragment, C>,
    ) -> Result<(), BspError> {
        let round = messages.round();
        ctx.seen.push(round);
        while messages.get_fragment_message::<u32>()?.is_some() {}

        if frag.fid() == 0 && round < self.send_until {
            messages.send_to_fragment(frag.fnum() - 1, round)?;
        }
        if frag.fid() == frag.fnum() - 1 && round < self.continue_until {
            messages.force_continue();
        }
        if self.stop_at == Some((frag.fid(), round)) {
            messages.force_terminate("scripted stop");
        }
        Ok(())
    }
}

impl App for Scripted {
    type Fragment = EdgecutFragment;
    type Context = RoundLog<EdgecutFragment>;

    const MESSAGE_STRATEGY: MessageStrategy = MessageStrategy::SyncOnOuterVertex;

    fn peval<C: Communicator>(
        &self,
        frag: &EdgecutFragment,
        ctx: &mut Self::Context,
        messages: &mut MessageManager<EdgecutFragment, C>,
    ) -> Result<(), BspError> {
        self.step(frag, ctx, messages)
    }

    fn inc_eval<C: Communicator>(
        &self,
        frag: &EdgecutFragment,
        ctx: &mut Self::Context,
        messages: &mut MessageManager<EdgecutFragment, C>,
    ) -> Result<(), BspError> {
        self.step(frag, ctx, messages)
    }
}

fn fragments(fnum: usize) -> Vec<EdgecutFragment> {
    partition_unweighted(12, &random_edges(12, 20, 7), fnum, false)
}

/// `(report, rounds seen)` for every fragment.
fn run_scripted<M>(fnum: usize, make: M) -> Vec<(QueryReport, Vec<u32>)>
where
    M: Fn() -> Scripted + Send + Sync + 'static,
{
    run_group(fragments(fnum), move |frag, comm| {
        let mut worker = Worker::<Scripted, LocalComm>::new(Arc::new(make()), Arc::new(frag)).unwrap();
        worker.init(comm, &ParallelEngineSpec::sequential()).unwrap();
        let report = worker.query(()).unwrap();
        let seen = worker.get_context().unwrap().seen.clone();
        (report, seen)
    })
}

#[test]
fn idle_app_stops_after_peval() {
    for (report, seen) in run_scripted(3, Scripted::default) {
        assert_eq!(report.rounds, 0);
        assert_eq!(seen, vec![0]);
        assert_eq!(report.termination, Some(Termination::Quiescent));
        assert_eq!(report.messages_sent, 0);
    }
}

#[test]
fn one_busy_fragment_keeps_everyone_running() {
    for until in [1u32, 2, 5] {
        let results = run_scripted(4, move || Scripted {
            send_until: until,
            ..Scripted::default()
        });
        for (fid, (report, seen)) in results.iter().enumerate() {
            assert_eq!(report.rounds, until, "fragment {fid}");
            assert_eq!(*seen, (0..=until).collect::<Vec<_>>(), "fragment {fid}");
            assert_eq!(report.termination, Some(Termination::Quiescent));
        }
        assert_eq!(results[0].0.messages_sent, until as u64);
        assert_eq!(results[1].0.messages_sent, 0);
    }
}

#[test]
fn force_continue_without_traffic() {
    let results = run_scripted(3, || Scripted {
        continue_until: 3,
        ..Scripted::default()
    });
    for (report, seen) in results {
        assert_eq!(report.rounds, 3);
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert_eq!(report.messages_sent, 0);
    }
}

#[test]
fn forced_termination_beats_pending_traffic() {
    let results = run_scripted(3, || Scripted {
        send_until: u32::MAX,
        continue_until: u32::MAX,
        stop_at: Some((1, 2)),
    });
    for (fid, (report, seen)) in results.into_iter().enumerate() {
        assert_eq!(report.rounds, 2);
        assert_eq!(seen, vec![0, 1, 2]);
        let reason = (fid == 1).then(|| "scripted stop".to_string());
        assert_eq!(report.termination, Some(Termination::Forced { votes: 1, reason }));
    }
}

#[test]
fn single_fragment_without_communicator() {
    let frag = fragments(1).pop().unwrap();
    let app = Scripted {
        send_until: 2,
        ..Scripted::default()
    };
    let mut worker = Worker::<Scripted, NoComm>::new(Arc::new(app), Arc::new(frag)).unwrap();
    worker.init(NoComm, &ParallelEngineSpec::sequential()).unwrap();
    // self-addressed messages count as traffic
    let report = worker.query(()).unwrap();
    assert_eq!(report.rounds, 2);
    assert_eq!(report.messages_sent, 2);
}
