// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Concurrent quorum collection over a fixed set of signers.
//!
//! Every signer is queried at once; responses are folded into an accumulator
//! in arrival order until the reducer declares success, declares failure, or
//! the deadline passes.

use futures::{future::BoxFuture, stream::FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout as tokio_timeout;

pub type AsyncResult<'a, T, E> = BoxFuture<'a, Result<T, E>>;

/// Result of folding a single response into the accumulated state
pub enum ReduceOutput<R, S> {
    Continue(S),
    Failed(S),
    Success(R),
}

impl<R, S> ReduceOutput<R, S> {
    pub fn map_err<E, F>(self, f: F) -> Result<R, E>
    where
        F: FnOnce(S) -> E,
    {
        match self {
            ReduceOutput::Success(r) => Ok(r),
            ReduceOutput::Failed(s) | ReduceOutput::Continue(s) => Err(f(s)),
        }
    }
}

/// Query every client in `clients` concurrently and reduce their responses.
///
/// Returns `Ok(R)` as soon as the reducer yields `Success`. Returns the
/// accumulated state as `Err` when the reducer yields `Failed`, when every
/// client has answered without success, or when `total_timeout` elapses.
/// Outstanding requests are dropped on return.
pub async fn quorum_map_then_reduce_with_timeout<
    'a,
    K,
    Client: ?Sized + 'a,
    State,
    V,
    R,
    E,
    FMap,
    FReduce,
>(
    clients: Arc<BTreeMap<K, Arc<Client>>>,
    mut accumulated_state: State,
    map_each_client: FMap,
    mut reduce_result: FReduce,
    total_timeout: Duration,
) -> Result<R, State>
where
    K: Ord + Clone + Send + 'a,
    FMap: FnOnce(K, Arc<Client>) -> AsyncResult<'a, V, E> + Clone + 'a,
    FReduce: FnMut(State, K, Result<V, E>) -> ReduceOutput<R, State>,
    V: Send + 'a,
    E: Send + 'a,
{
    let start = Instant::now();

    let mut responses: FuturesUnordered<_> = clients
        .iter()
        .map(|(name, client)| {
            let execute = map_each_client.clone();
            let name = name.clone();
            let client = client.clone();
            async move { (name.clone(), execute(name, client).await) }
        })
        .collect();

    while let Ok(Some((name, result))) = tokio_timeout(
        total_timeout.saturating_sub(start.elapsed()),
        responses.next(),
    )
    .await
    {
        accumulated_state = match reduce_result(accumulated_state, name, result) {
            ReduceOutput::Continue(state) => state,
            ReduceOutput::Failed(state) => return Err(state),
            ReduceOutput::Success(result) => return Ok(result),
        };
    }

    Err(accumulated_state)
}
