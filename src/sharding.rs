//! Union-find shard actors.
//!
//! Every shard runs as its own tokio task that exclusively owns a
//! [`ShardUnionFind`]. Callers talk to it through a [`ShardHandle`]: each
//! command carries a oneshot responder, and commands from one caller are
//! served in the order they were sent.

use crate::dsu::ShardUnionFind;
use crate::error::ShardError;
use crate::model::{Edge, EdgeBatches, NodeId};
use rustc_hash::FxHashSet;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

/// Requests a shard actor understands.
#[derive(Debug)]
pub enum ShardCommand {
    UnionLists {
        lists: Vec<Vec<NodeId>>,
        respond_to: oneshot::Sender<usize>,
    },
    Rebalance {
        respond_to: oneshot::Sender<()>,
    },
    EdgeRedistribution {
        respond_to: oneshot::Sender<EdgeBatches>,
    },
    Communicate {
        respond_to: oneshot::Sender<EdgeBatches>,
    },
    ReceiveEdges {
        edges: Vec<Edge>,
        respond_to: oneshot::Sender<()>,
    },
    BalancedUnionFind {
        respond_to: oneshot::Sender<bool>,
    },
    Nodes {
        respond_to: oneshot::Sender<FxHashSet<NodeId>>,
    },
}

fn handle_command(shard: &mut ShardUnionFind, command: ShardCommand) {
    match command {
        ShardCommand::UnionLists { lists, respond_to } => {
            for list in &lists {
                shard.union_list(list);
            }
            let _ = respond_to.send(lists.len());
        }
        ShardCommand::Rebalance { respond_to } => {
            shard.rebalance();
            let _ = respond_to.send(());
        }
        ShardCommand::EdgeRedistribution { respond_to } => {
            let _ = respond_to.send(shard.edge_redistribution());
        }
        ShardCommand::Communicate { respond_to } => {
            let _ = respond_to.send(shard.communicate());
        }
        ShardCommand::ReceiveEdges { edges, respond_to } => {
            shard.receive_edges(edges);
            let _ = respond_to.send(());
        }
        ShardCommand::BalancedUnionFind { respond_to } => {
            let _ = respond_to.send(shard.balanced_union_find());
        }
        ShardCommand::Nodes { respond_to } => {
            let _ = respond_to.send(shard.nodes());
        }
    }
}

/// Spawn the actor task for one shard. Must be called inside a tokio runtime.
pub fn spawn_shard_worker(
    mut shard: ShardUnionFind,
    queue_capacity: usize,
) -> mpsc::Sender<ShardCommand> {
    let (tx, mut rx) = mpsc::channel::<ShardCommand>(queue_capacity.max(1));
    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            handle_command(&mut shard, command);
        }
        trace!(shard_id = shard.shard_id(), "shard worker stopped");
    });
    tx
}

/// Address of one running shard.
#[derive(Debug, Clone)]
pub struct ShardHandle {
    shard_id: usize,
    tx: mpsc::Sender<ShardCommand>,
}

impl ShardHandle {
    pub fn new(shard_id: usize, tx: mpsc::Sender<ShardCommand>) -> Self {
        Self { shard_id, tx }
    }

    pub fn shard_id(&self) -> usize {
        self.shard_id
    }

    /// Enqueue a command without waiting for the reply.
    pub async fn dispatch<T, F>(&self, build: F) -> Result<oneshot::Receiver<T>, ShardError>
    where
        F: FnOnce(oneshot::Sender<T>) -> ShardCommand,
    {
        let (respond_to, rx) = oneshot::channel();
        self.tx
            .send(build(respond_to))
            .await
            .map_err(|_| ShardError::Unavailable {
                shard: self.shard_id,
            })?;
        Ok(rx)
    }

    /// Wait for the reply to a dispatched command.
    pub async fn reply<T>(&self, rx: oneshot::Receiver<T>) -> Result<T, ShardError> {
        rx.await.map_err(|_| ShardError::Dropped {
            shard: self.shard_id,
        })
    }
}

/// The P shard handles, indexed by shard id.
#[derive(Debug, Clone)]
pub struct ShardDirectory {
    handles: Vec<ShardHandle>,
}

impl ShardDirectory {
    /// Start `shard_count` fresh shard actors.
    pub fn spawn(shard_count: usize, queue_capacity: usize) -> Self {
        let handles = (0..shard_count)
            .map(|shard_id| {
                let tx = spawn_shard_worker(
                    ShardUnionFind::new(shard_id, shard_count),
                    queue_capacity,
                );
                ShardHandle::new(shard_id, tx)
            })
            .collect();
        Self { handles }
    }

    pub fn from_handles(handles: Vec<ShardHandle>) -> Self {
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn get(&self, shard: usize) -> Result<&ShardHandle, ShardError> {
        self.handles.get(shard).ok_or(ShardError::UnknownShard {
            shard,
            count: self.handles.len(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShardHandle> {
        self.handles.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn call<T, F>(handle: &ShardHandle, build: F) -> Result<T, ShardError>
    where
        F: FnOnce(oneshot::Sender<T>) -> ShardCommand,
    {
        let rx = handle.dispatch(build).await?;
        handle.reply(rx).await
    }

    #[tokio::test]
    async fn test_shard_actor_serves_commands_in_order() {
        let directory = ShardDirectory::spawn(2, 4);
        let shard = directory.get(0).unwrap();

        let applied = call(shard, |respond_to| ShardCommand::UnionLists {
            lists: vec![vec![NodeId(4), NodeId(2)]],
            respond_to,
        })
        .await
        .unwrap();
        assert_eq!(applied, 1);

        let nodes = call(shard, |respond_to| ShardCommand::Nodes { respond_to })
            .await
            .unwrap();
        assert!(nodes.contains(&NodeId(4)));
        assert_eq!(nodes.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_shard_is_unavailable() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = ShardHandle::new(3, tx);
        let err = call(&handle, |respond_to| ShardCommand::Rebalance { respond_to })
            .await
            .unwrap_err();
        assert!(matches!(err, ShardError::Unavailable { shard: 3 }));
    }

    #[tokio::test]
    async fn test_dropped_responder_is_reported() {
        let (tx, mut rx) = mpsc::channel::<ShardCommand>(1);
        tokio::spawn(async move {
            // Swallow the command without replying.
            let _ = rx.recv().await;
        });
        let handle = ShardHandle::new(1, tx);
        let err = call(&handle, |respond_to| ShardCommand::BalancedUnionFind {
            respond_to,
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ShardError::Dropped { shard: 1 }));
    }

    #[test]
    fn test_unknown_shard() {
        let directory = ShardDirectory::from_handles(Vec::new());
        assert!(matches!(
            directory.get(2),
            Err(ShardError::UnknownShard { shard: 2, count: 0 })
        ));
    }
}
