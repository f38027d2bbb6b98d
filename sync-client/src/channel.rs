//! Typed room channel.
//!
//! [`RoomChannel`] wraps a [`Transport`] with the floorsync message set:
//! it builds envelopes (stamping the acting user and the session id) and
//! decodes inbound frames. It holds no business logic.

use std::sync::Arc;

use floorsync_types::{
    AddMarker, DeleteMarker, Envelope, FloorPlanId, Marker, MarkerChanges, MarkerId, Message,
    PresenceHeartbeat, PresenceLeave, SessionId, UpdateMarker, UserId,
};

use crate::clock::unix_millis;
use crate::error::ClientError;
use crate::transport::Transport;

/// A session's view of the channel service.
pub struct RoomChannel<T: Transport> {
    transport: Arc<T>,
    user_id: UserId,
    session_id: SessionId,
}

impl<T: Transport> Clone for RoomChannel<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            user_id: self.user_id.clone(),
            session_id: self.session_id,
        }
    }
}

impl<T: Transport> RoomChannel<T> {
    /// Create a channel for `user_id` acting within `session_id`.
    pub fn new(transport: Arc<T>, user_id: UserId, session_id: SessionId) -> Self {
        Self {
            transport,
            user_id,
            session_id,
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// The session id stamped on outbound marker messages.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Whether the transport is connected.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Subscribe to the floor plan's room.
    pub async fn join(&self, floor_plan_id: &FloorPlanId) -> Result<(), ClientError> {
        self.transport.join_room(floor_plan_id.as_str()).await?;
        Ok(())
    }

    /// Unsubscribe from the floor plan's room.
    pub async fn leave(&self, floor_plan_id: &FloorPlanId) -> Result<(), ClientError> {
        self.transport.leave_room(floor_plan_id.as_str()).await?;
        Ok(())
    }

    /// Broadcast a new marker.
    pub async fn send_marker_add(
        &self,
        floor_plan_id: &FloorPlanId,
        marker: &Marker,
    ) -> Result<(), ClientError> {
        self.send(Message::MarkerAdd(AddMarker {
            floor_plan_id: floor_plan_id.clone(),
            client_id: self.session_id,
            marker: marker.clone(),
        }))
        .await
    }

    /// Broadcast field changes to a marker.
    pub async fn send_marker_update(
        &self,
        floor_plan_id: &FloorPlanId,
        marker_id: &MarkerId,
        changes: &MarkerChanges,
    ) -> Result<(), ClientError> {
        self.send(Message::MarkerUpdate(UpdateMarker {
            floor_plan_id: floor_plan_id.clone(),
            client_id: self.session_id,
            marker_id: marker_id.clone(),
            changes: changes.clone(),
        }))
        .await
    }

    /// Broadcast a marker removal.
    pub async fn send_marker_delete(
        &self,
        floor_plan_id: &FloorPlanId,
        marker_id: &MarkerId,
    ) -> Result<(), ClientError> {
        self.send(Message::MarkerDelete(DeleteMarker {
            floor_plan_id: floor_plan_id.clone(),
            client_id: self.session_id,
            marker_id: marker_id.clone(),
        }))
        .await
    }

    /// Broadcast a presence heartbeat.
    pub async fn send_presence_heartbeat(
        &self,
        heartbeat: PresenceHeartbeat,
    ) -> Result<(), ClientError> {
        self.send(Message::PresenceHeartbeat(heartbeat)).await
    }

    /// Broadcast a presence leave.
    pub async fn send_presence_leave(&self, leave: PresenceLeave) -> Result<(), ClientError> {
        self.send(Message::PresenceLeave(leave)).await
    }

    /// Wrap a message in an envelope and send it to its floor plan's room.
    pub async fn send(&self, message: Message) -> Result<(), ClientError> {
        let room = message.floor_plan_id().as_str().to_string();
        let kind = message.kind();
        let bytes = Envelope::new(self.user_id.clone(), unix_millis(), message).to_bytes()?;
        self.transport.send(&room, &bytes).await?;
        tracing::debug!("Sent {} ({} bytes) to {}", kind, bytes.len(), room);
        Ok(())
    }

    /// Receive and decode the next frame.
    ///
    /// Transport errors end the stream; decode errors are returned as
    /// [`ClientError::Wire`] so the caller can skip the frame.
    pub async fn recv_envelope(&self) -> Result<Envelope, ClientError> {
        let bytes = self.transport.recv().await?;
        Ok(Envelope::from_bytes(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, TransportError};
    use floorsync_types::{MarkerType, PresenceUser};

    fn plan() -> FloorPlanId {
        FloorPlanId::from("plan-1")
    }

    fn channel(transport: &MockTransport) -> RoomChannel<MockTransport> {
        RoomChannel::new(
            Arc::new(transport.clone()),
            UserId::from("alice"),
            SessionId::new(),
        )
    }

    #[tokio::test]
    async fn marker_add_carries_session_and_user() {
        let transport = MockTransport::connected();
        let channel = channel(&transport);
        let marker = Marker::new("m1", MarkerType::FireExtinguisher, "Lobby", 10.0, 20.0);

        channel.send_marker_add(&plan(), &marker).await.unwrap();

        let sent = transport.sent_to("plan-1");
        assert_eq!(sent.len(), 1);
        let envelope = Envelope::from_bytes(&sent[0]).unwrap();
        assert_eq!(envelope.user_id, UserId::from("alice"));
        match envelope.message {
            Message::MarkerAdd(add) => {
                assert_eq!(add.client_id, channel.session_id());
                assert_eq!(add.marker, marker);
            }
            other => panic!("Expected MarkerAdd, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn heartbeat_goes_to_its_floor_plan_room() {
        let transport = MockTransport::connected();
        let channel = channel(&transport);

        channel
            .send_presence_heartbeat(PresenceHeartbeat {
                floor_plan_id: FloorPlanId::from("plan-9"),
                user: PresenceUser::new("alice", "Alice"),
                is_editing: true,
            })
            .await
            .unwrap();

        assert_eq!(transport.sent_to("plan-9").len(), 1);
        assert!(transport.sent_to("plan-1").is_empty());
    }

    #[tokio::test]
    async fn send_failure_surfaces_transport_error() {
        let transport = MockTransport::connected();
        transport.fail_next_send("socket reset");
        let channel = channel(&transport);

        let result = channel.send_marker_delete(&plan(), &MarkerId::from("m1")).await;
        assert!(matches!(
            result,
            Err(ClientError::Transport(TransportError::SendFailed(_)))
        ));
    }

    #[tokio::test]
    async fn recv_decodes_envelopes_and_reports_garbage() {
        let transport = MockTransport::connected();
        let channel = channel(&transport);
        let envelope = Envelope::new(
            UserId::from("bob"),
            0,
            Message::PresenceLeave(PresenceLeave {
                floor_plan_id: plan(),
                user_id: UserId::from("bob"),
            }),
        );
        transport.queue_response(envelope.to_bytes().unwrap());
        transport.queue_response(vec![0xc1]);

        assert_eq!(channel.recv_envelope().await.unwrap(), envelope);
        assert!(matches!(channel.recv_envelope().await, Err(ClientError::Wire(_))));
        assert!(matches!(
            channel.recv_envelope().await,
            Err(ClientError::Transport(TransportError::ConnectionClosed))
        ));
    }
}
