use femassembly::comm::{Communicator, SerialCommunicator, ThreadCommunicator};
use femassembly::error::DistributedError;

#[test]
fn serial_communicator_gathers_its_own_contribution() {
    let comm = SerialCommunicator;
    assert_eq!(comm.rank(), 0);
    assert_eq!(comm.size(), 1);
    assert_eq!(comm.all_gather_usize(7), Ok(vec![7]));
    assert_eq!(comm.all_gather_indices(&[1, 2]), Ok(vec![vec![1, 2]]));
    assert_eq!(comm.all_gather_reals(&[0.5]), Ok(vec![vec![0.5]]));
    assert_eq!(comm.barrier(), Ok(()));
}

#[test]
fn thread_communicator_gathers_in_rank_order() {
    let results = ThreadCommunicator::run(4, |comm| {
        assert_eq!(comm.size(), 4);
        comm.all_gather_usize(10 * comm.rank()).unwrap()
    });
    assert_eq!(results.len(), 4);
    for gathered in results {
        assert_eq!(gathered, vec![0, 10, 20, 30]);
    }
}

#[test]
fn thread_communicator_gathers_variable_lengths() {
    let results = ThreadCommunicator::run(3, |comm| {
        let local: Vec<f64> = (0..comm.rank()).map(|i| i as f64).collect();
        let reals = comm.all_gather_reals(&local).unwrap();
        comm.barrier().unwrap();
        let indices = comm.all_gather_indices(&[comm.rank(); 2]).unwrap();
        (comm.rank(), reals, indices)
    });

    for (rank, (result_rank, reals, indices)) in results.into_iter().enumerate() {
        assert_eq!(result_rank, rank);
        assert_eq!(reals, vec![vec![], vec![0.0], vec![0.0, 1.0]]);
        assert_eq!(indices, vec![vec![0, 0], vec![1, 1], vec![2, 2]]);
    }
}

#[test]
fn mismatched_collectives_are_detected() {
    let results = ThreadCommunicator::run(2, |comm| {
        if comm.rank() == 0 {
            comm.all_gather_indices(&[1]).map(|_| ())
        } else {
            comm.all_gather_reals(&[1.0]).map(|_| ())
        }
    });
    assert_eq!(
        results,
        vec![
            Err(DistributedError::CollectiveKindMismatch { rank: 1 }),
            Err(DistributedError::CollectiveKindMismatch { rank: 0 }),
        ]
    );
}

#[test]
fn created_communicators_can_be_driven_manually() {
    let communicators = ThreadCommunicator::create(2);
    let gathered = std::thread::scope(|scope| {
        let handles: Vec<_> = communicators
            .iter()
            .map(|comm| scope.spawn(move || comm.all_gather_usize(comm.rank() + 1).unwrap()))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>()
    });
    assert_eq!(gathered, vec![vec![1, 2], vec![1, 2]]);
}

#[test]
fn early_return_releases_waiting_ranks() {
    let results = ThreadCommunicator::run(3, |comm| -> Result<(), DistributedError> {
        if comm.rank() == 2 {
            // Leaves without joining any collective
            return Ok(());
        }
        comm.all_gather_usize(comm.rank())?;
        comm.barrier()
    });
    assert_eq!(
        results,
        vec![
            Err(DistributedError::RankDeparted { rank: 2 }),
            Err(DistributedError::RankDeparted { rank: 2 }),
            Ok(()),
        ]
    );
}

#[test]
fn finished_ranks_do_not_fail_completed_collectives() {
    for _ in 0..20 {
        let results = ThreadCommunicator::run(4, |comm| -> Result<Vec<usize>, DistributedError> {
            let gathered = comm.all_gather_indices(&[comm.rank()])?;
            comm.barrier()?;
            Ok(gathered.concat())
        });
        for gathered in results {
            assert_eq!(gathered, Ok(vec![0, 1, 2, 3]));
        }
    }
}

#[test]
fn dropped_communicator_fails_later_collectives() {
    let mut communicators = ThreadCommunicator::create(2);
    drop(communicators.pop());
    let comm = &communicators[0];
    assert_eq!(comm.all_gather_usize(1), Err(DistributedError::RankDeparted { rank: 1 }));
    assert_eq!(comm.barrier(), Err(DistributedError::RankDeparted { rank: 1 }));
}
