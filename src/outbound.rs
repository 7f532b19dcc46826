// ====================================================================================
// src/outbound.rs - 连接的发送队列：gameState 快照可丢，其余帧必达
// ====================================================================================
use crate::models::{Outbound, ServerMessage};
use tokio::sync::mpsc;

/// 快照走有界队列，满了丢帧；控制帧走无界队列，写任务优先取
pub fn channel(snapshot_buffer: usize) -> (OutboundSender, OutboundReceiver) {
    let (snapshots_tx, snapshots_rx) = mpsc::channel(snapshot_buffer);
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    (
        OutboundSender { snapshots: snapshots_tx, control: control_tx },
        OutboundReceiver { snapshots: snapshots_rx, control: control_rx },
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    Dropped,
    Closed,
}

fn is_snapshot(outbound: &Outbound) -> bool {
    matches!(outbound, Outbound::Message(ServerMessage::GameState { .. }))
}

// 这些帧之后旧快照已无意义
fn ends_run(outbound: &Outbound) -> bool {
    matches!(
        outbound,
        Outbound::Close
            | Outbound::Message(
                ServerMessage::Kicked
                    | ServerMessage::RoomClosed { .. }
                    | ServerMessage::GameOver { .. }
                    | ServerMessage::ReturnToLobby { .. }
            )
    )
}

#[derive(Debug, Clone)]
pub struct OutboundSender {
    snapshots: mpsc::Sender<Outbound>,
    control: mpsc::UnboundedSender<Outbound>,
}

impl OutboundSender {
    pub fn push(&self, outbound: Outbound) -> Delivery {
        if is_snapshot(&outbound) {
            return match self.snapshots.try_send(outbound) {
                Ok(()) => Delivery::Queued,
                Err(mpsc::error::TrySendError::Full(_)) => Delivery::Dropped,
                Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
            };
        }
        match self.control.send(outbound) {
            Ok(()) => Delivery::Queued,
            Err(_) => Delivery::Closed,
        }
    }
}

#[derive(Debug)]
pub struct OutboundReceiver {
    snapshots: mpsc::Receiver<Outbound>,
    control: mpsc::UnboundedReceiver<Outbound>,
}

impl OutboundReceiver {
    /// 所有发送端都释放后返回 None
    pub async fn recv(&mut self) -> Option<Outbound> {
        tokio::select! {
            biased;
            Some(outbound) = self.control.recv() => {
                if ends_run(&outbound) {
                    while self.snapshots.try_recv().is_ok() {}
                }
                Some(outbound)
            }
            Some(outbound) = self.snapshots.recv() => Some(outbound),
            else => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(elapsed_time: f64) -> Outbound {
        Outbound::Message(ServerMessage::GameState { elapsed_time, players: vec![], cacti: vec![] })
    }

    #[tokio::test]
    async fn control_frames_survive_a_full_snapshot_queue() {
        let (tx, mut rx) = channel(1);
        assert_eq!(tx.push(snapshot(0.1)), Delivery::Queued);
        assert_eq!(tx.push(snapshot(0.2)), Delivery::Dropped);
        assert_eq!(tx.push(Outbound::Message(ServerMessage::Kicked)), Delivery::Queued);
        assert_eq!(tx.push(Outbound::Close), Delivery::Queued);

        assert_eq!(rx.recv().await, Some(Outbound::Message(ServerMessage::Kicked)));
        assert_eq!(rx.recv().await, Some(Outbound::Close));
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn snapshots_survive_non_terminal_control_frames() {
        let (tx, mut rx) = channel(4);
        let died = Outbound::Message(ServerMessage::PlayerDied { player_id: uuid::Uuid::new_v4() });
        tx.push(died.clone());
        tx.push(snapshot(0.5));

        assert_eq!(rx.recv().await, Some(died));
        assert_eq!(rx.recv().await, Some(snapshot(0.5)));
    }

    #[tokio::test]
    async fn push_reports_closed_receiver() {
        let (tx, rx) = channel(4);
        drop(rx);
        assert_eq!(tx.push(snapshot(0.1)), Delivery::Closed);
        assert_eq!(tx.push(Outbound::Close), Delivery::Closed);
    }
}
