//! RabbitMQ-backed `Broker` via `lapin`. Uses `basic_get` rather than a
//! long-lived consumer tag so `consume_one` can be called from a plain
//! poll loop the same way the in-memory broker is.

use async_trait::async_trait;
use lapin::acker::Acker;
use lapin::options::{BasicAckOptions, BasicGetOptions, BasicNackOptions, BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};

use super::{Broker, Delivery};
use crate::config::BrokerConfig;
use crate::error::{PipelineError, Result};

pub struct AmqpBroker {
    channel: Channel,
}

impl AmqpBroker {
    pub async fn connect(config: &BrokerConfig) -> Result<Self> {
        let scheme = if config.use_tls { "amqps" } else { "amqp" };
        let uri = format!(
            "{}://{}:{}@{}:{}/%2f",
            scheme, config.user, config.pass, config.host, config.port
        );
        let connection = Connection::connect(&uri, ConnectionProperties::default())
            .await
            .map_err(|e| PipelineError::TransientExchange(format!("amqp connect failed: {e}")))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| PipelineError::BrokerDelivery(format!("amqp channel failed: {e}")))?;
        Ok(Self { channel })
    }

    async fn ensure_queue(&self, queue: &str) -> Result<()> {
        self.channel
            .queue_declare(queue, QueueDeclareOptions::default(), FieldTable::default())
            .await
            .map_err(|e| PipelineError::BrokerDelivery(format!("queue declare {queue} failed: {e}")))?;
        Ok(())
    }
}

struct AmqpDelivery {
    acker: Acker,
    body: Vec<u8>,
}

#[async_trait]
impl Delivery for AmqpDelivery {
    fn body(&self) -> &[u8] {
        &self.body
    }

    async fn ack(self: Box<Self>) -> Result<()> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| PipelineError::BrokerDelivery(format!("ack failed: {e}")))
    }

    async fn nack_requeue(self: Box<Self>) -> Result<()> {
        self.acker
            .nack(BasicNackOptions { requeue: true, ..Default::default() })
            .await
            .map_err(|e| PipelineError::BrokerDelivery(format!("nack failed: {e}")))
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        self.ensure_queue(queue).await?;
        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(|e| PipelineError::BrokerDelivery(format!("publish to {queue} failed: {e}")))?
            .await
            .map_err(|e| PipelineError::BrokerDelivery(format!("publish confirm for {queue} failed: {e}")))?;
        Ok(())
    }

    async fn consume_one(&self, queue: &str) -> Result<Option<Box<dyn Delivery>>> {
        self.ensure_queue(queue).await?;
        let message = self
            .channel
            .basic_get(queue, BasicGetOptions::default())
            .await
            .map_err(|e| PipelineError::BrokerDelivery(format!("basic_get {queue} failed: {e}")))?;
        Ok(message.map(|msg| {
            Box::new(AmqpDelivery {
                acker: msg.delivery.acker,
                body: msg.delivery.data,
            }) as Box<dyn Delivery>
        }))
    }
}
