/*!
   Run independent I/O-bound tasks concurrently and join their results.
*/

use std::sync::Mutex;
use std::thread;

use crate::error::Error;
use crate::util::mutex::MutexUtil;

/**
   Run `task` once per item on its own scoped thread and collect the results
   in the same order as `items`.

   All tasks run to completion. If any task fails, the first error recorded
   is returned and the other results are discarded.
*/
pub fn try_join_all<T, R>(
    items: &[T],
    task: impl Fn(usize, &T) -> Result<R, Error> + Sync,
) -> Result<Vec<R>, Error>
where
    T: Sync,
    R: Send,
{
    let results: Mutex<Vec<Option<R>>> = Mutex::new(items.iter().map(|_| None).collect());
    let first_error: Mutex<Option<Error>> = Mutex::new(None);

    thread::scope(|s| {
        for (i, item) in items.iter().enumerate() {
            let task = &task;
            let results = &results;
            let first_error = &first_error;

            s.spawn(move || {
                let outcome = task(i, item);

                match outcome {
                    Ok(value) => {
                        if let Ok(mut results) = results.acquire_mutex() {
                            results[i] = Some(value);
                        }
                    }
                    Err(e) => {
                        if let Ok(mut first_error) = first_error.acquire_mutex() {
                            first_error.get_or_insert(e);
                        }
                    }
                }
            });
        }
    });

    if let Some(e) = first_error.into_inner().map_err(|_| Error::poisoned_mutex())? {
        return Err(e);
    }

    results
        .into_inner()
        .map_err(|_| Error::poisoned_mutex())?
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(Error::poisoned_mutex)
}

#[cfg(test)]
mod tests {
    use super::*;

    use eyre::eyre;

    #[test]
    fn preserves_item_order() {
        let items = vec![3u64, 1, 2];

        let res = try_join_all(&items, |i, item| {
            std::thread::sleep(core::time::Duration::from_millis(*item * 5));
            Ok((i, item * 10))
        })
        .unwrap();

        assert_eq!(res, vec![(0, 30), (1, 10), (2, 20)]);
    }

    #[test]
    fn any_failure_fails_the_join() {
        let items = vec!["a", "b", "c"];

        let res = try_join_all(&items, |_, item| {
            if *item == "b" {
                Err(Error::generic(eyre!("failed on {}", item)))
            } else {
                Ok(())
            }
        });

        assert!(res.is_err());
    }

    #[test]
    fn empty_input() {
        let items: Vec<u8> = Vec::new();
        let res = try_join_all(&items, |_, _| Ok(())).unwrap();
        assert!(res.is_empty());
    }
}
