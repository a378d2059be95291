//! In-process `Broker` backed by per-queue FIFO deques, for tests and
//! default wiring without RabbitMQ configured.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{Broker, Delivery};
use crate::error::Result;

#[derive(Default)]
pub struct InMemoryBroker {
    queues: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
}

struct InMemoryDelivery {
    body: Vec<u8>,
}

#[async_trait]
impl Delivery for InMemoryDelivery {
    fn body(&self) -> &[u8] {
        &self.body
    }

    async fn ack(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    async fn nack_requeue(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        self.queues
            .lock()
            .unwrap()
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.to_vec());
        Ok(())
    }

    async fn consume_one(&self, queue: &str) -> Result<Option<Box<dyn Delivery>>> {
        let body = self.queues.lock().unwrap().get_mut(queue).and_then(|q| q.pop_front());
        Ok(body.map(|body| Box::new(InMemoryDelivery { body }) as Box<dyn Delivery>))
    }
}
