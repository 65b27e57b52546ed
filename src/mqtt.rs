use crate::configuration::Mqtt;
use crate::error::Result;
use log::{debug, info, trace, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::task::{self, JoinHandle};

/// Sends messages to the broker
#[allow(async_fn_in_trait)]
pub trait Publisher {
    /// Publishes a payload on a topic without waiting for any acknowledgment
    ///
    /// An empty payload on a discovery topic removes the sensor from Home Assistant.
    async fn publish(&mut self, topic: &str, payload: &str) -> Result<()>;
}

/// Connected MQTT session
pub struct MqttSession {
    client: AsyncClient,
    event_loop: JoinHandle<()>,
}

impl MqttSession {
    /// Connects to the broker and waits until the connection is accepted
    ///
    /// A refused or unreachable broker is returned as an error. Once connected, the event loop
    /// is driven by a background task until [`MqttSession::close`] is called.
    pub async fn connect(mqtt: &Mqtt<'_>) -> Result<MqttSession> {
        let mut options = MqttOptions::new(mqtt.client_id, mqtt.host, mqtt.port);
        if !mqtt.username.is_empty() {
            options.set_credentials(mqtt.username, mqtt.password);
        }

        info!("Connecting to MQTT broker {}:{}", mqtt.host, mqtt.port);

        let (client, mut event_loop) = AsyncClient::new(options, 16);
        wait_for_connection(&mut event_loop).await?;

        let event_loop = task::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        debug!("Disconnected from MQTT broker");
                        break;
                    }
                    Ok(notification) => trace!("MQTT notification received: {notification:?}"),
                    Err(e) => {
                        warn!("MQTT connection lost: {e}");
                        break;
                    }
                }
            }
        });

        Ok(MqttSession { client, event_loop })
    }

    /// Sends the pending messages, disconnects and waits for the event loop to stop
    pub async fn close(self) -> Result<()> {
        self.client.disconnect().await?;
        self.event_loop.await?;
        Ok(())
    }
}

impl Publisher for MqttSession {
    async fn publish(&mut self, topic: &str, payload: &str) -> Result<()> {
        debug!("Publishing to topic {topic} : {payload}");
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_string())
            .await?;
        Ok(())
    }
}

async fn wait_for_connection(event_loop: &mut EventLoop) -> Result<()> {
    loop {
        match event_loop.poll().await? {
            Event::Incoming(Packet::ConnAck(ack)) => {
                debug!("MQTT connected: {ack:?}");
                return Ok(());
            }
            notification => trace!("MQTT notification received: {notification:?}"),
        }
    }
}
