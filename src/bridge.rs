//! Status hub to viewer hub forwarding
//!
//! The bridge is the status hub's inbound handler. Each inbound message is
//! already a serialized event and is handed unchanged to the viewer hub's
//! broadcast, in arrival order. Nothing flows the other way.

use crate::hub::{HubHandle, InboundHandler, Message};

pub struct Bridge {
    viewers: HubHandle,
}

impl Bridge {
    pub fn new(viewers: HubHandle) -> Self {
        Self { viewers }
    }
}

impl InboundHandler for Bridge {
    fn on_inbound(&mut self, message: Message) {
        tracing::trace!(
            origin = ?message.origin,
            len = message.data.len(),
            "Relaying status event"
        );
        self.viewers.broadcast(message.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{Client, Hub};

    #[tokio::test]
    async fn test_forwards_verbatim_in_order() {
        let (viewer_hub, viewers) = Hub::new("updates");
        viewer_hub.spawn();
        let (status_hub, status) = Hub::with_handler("status", Bridge::new(viewers.clone()));
        status_hub.spawn();

        let (viewer, mut rx) = Client::new("127.0.0.1:1".parse().unwrap());
        viewers.register(viewer);
        // Registration is applied before anything the bridge forwards
        viewers.stats().await.unwrap();

        status.submit_inbound(Message::internal("one"));
        status.submit_inbound(Message::internal(vec![0xFFu8, 0x00]));

        assert_eq!(rx.recv().await.unwrap(), "one");
        assert_eq!(&rx.recv().await.unwrap()[..], &[0xFF, 0x00]);
    }

    #[tokio::test]
    async fn test_status_clients_do_not_receive_inbound() {
        let (viewer_hub, viewers) = Hub::new("updates");
        viewer_hub.spawn();
        let (status_hub, status) = Hub::with_handler("status", Bridge::new(viewers));
        status_hub.spawn();

        let (reporter, mut rx) = Client::new("127.0.0.1:2".parse().unwrap());
        status.register(reporter);
        status.submit_inbound(Message::internal("event"));

        let stats = status.stats().await.unwrap();
        assert_eq!(stats.inbound, 1);
        assert_eq!(stats.broadcasts, 0);
        assert!(rx.try_recv().is_err());
    }
}
