/*!
   A single-slot channel used by background tasks to report how they ended.
*/

use crossbeam_channel as channel;

use crate::error::Error;

/**
   Create a connected [`CompletionSender`] and [`Completion`] pair.
*/
pub fn completion_pair(task_name: &str) -> (CompletionSender, Completion) {
    let (sender, receiver) = channel::bounded(1);

    (
        CompletionSender { sender },
        Completion {
            task_name: task_name.to_string(),
            receiver,
        },
    )
}

/**
   The reporting side, owned by the background task. It is consumed by
   [`complete`](CompletionSender::complete), so at most one result is ever
   delivered.
*/
pub struct CompletionSender {
    sender: channel::Sender<Result<(), Error>>,
}

impl CompletionSender {
    pub fn complete(self, result: Result<(), Error>) {
        // The receiving side may already be gone if the caller failed first.
        let _ = self.sender.send(result);
    }
}

/**
   The observing side, owned by the orchestration step that spawned the
   task. It is either still pending, holds an error, or has completed
   without error, and it is observed exactly once.
*/
pub struct Completion {
    task_name: String,
    receiver: channel::Receiver<Result<(), Error>>,
}

impl Completion {
    /**
       Block until the task reports. A task that exits without reporting
       is treated as a failure, since it most likely panicked.
    */
    pub fn wait(self) -> Result<(), Error> {
        match self.receiver.recv() {
            Ok(result) => result,
            Err(_) => Err(Error::background_task(self.task_name)),
        }
    }

    /**
       Check the task without blocking. Returns `None` while the task is
       still running, and hands the completion back so it can be checked
       again.
    */
    pub fn try_wait(self) -> Result<Option<Self>, Error> {
        match self.receiver.try_recv() {
            Ok(result) => result.map(|()| None),
            Err(channel::TryRecvError::Empty) => Ok(Some(self)),
            Err(channel::TryRecvError::Disconnected) => {
                Err(Error::background_task(self.task_name))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use eyre::eyre;
    use std::thread;

    #[test]
    fn delivers_error_from_background_thread() {
        let (sender, completion) = completion_pair("proposal");

        thread::spawn(move || sender.complete(Err(Error::generic(eyre!("vote failed")))));

        assert!(completion.wait().is_err());
    }

    #[test]
    fn pending_then_completed() {
        let (sender, completion) = completion_pair("proposal");

        let completion = completion.try_wait().unwrap().expect("task is still pending");

        sender.complete(Ok(()));

        assert!(completion.try_wait().unwrap().is_none());
    }

    #[test]
    fn dropped_sender_is_a_failure() {
        let (sender, completion) = completion_pair("proposal");
        drop(sender);

        assert!(completion.wait().is_err());
    }
}
