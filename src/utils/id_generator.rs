// src/utils/id_generator.rs
use chrono::{DateTime, Utc};
use rand::Rng;

/// Record kinds that receive server-generated ids. Seed and legacy records keep
/// whatever id they were stored with ("1", base36 strings from the browser build).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdType {
    Vehicle,
    Driver,
    Mission,
}

impl IdType {
    pub fn to_prefix(&self) -> &'static str {
        match self {
            IdType::Vehicle => "veh",
            IdType::Driver => "drv",
            IdType::Mission => "msn",
        }
    }
}

const SUFFIX_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 5;

pub struct IdGenerator;

impl IdGenerator {
    /// `{prefix}-{YYMMDD}-{5 lowercase alphanumerics}`, e.g. `msn-251017-k3x9a`
    pub fn generate(id_type: IdType) -> String {
        Self::generate_at(id_type, Utc::now())
    }

    pub fn generate_at(id_type: IdType, timestamp: DateTime<Utc>) -> String {
        let mut rng = rand::rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| SUFFIX_CHARS[rng.random_range(0..SUFFIX_CHARS.len())] as char)
            .collect();
        format!("{}-{}-{}", id_type.to_prefix(), timestamp.format("%y%m%d"), suffix)
    }
}

pub trait WithGeneratedId {
    fn set_generated_id(&mut self, id_type: IdType);

    fn with_generated_id(mut self, id_type: IdType) -> Self
    where
        Self: Sized,
    {
        self.set_generated_id(id_type);
        self
    }
}

impl WithGeneratedId for crate::models::vehicle::Vehicle {
    fn set_generated_id(&mut self, id_type: IdType) {
        self.id = IdGenerator::generate(id_type);
    }
}

impl WithGeneratedId for crate::models::mission::Mission {
    fn set_generated_id(&mut self, id_type: IdType) {
        self.id = IdGenerator::generate(id_type);
    }
}

pub fn generate_driver_id() -> String {
    IdGenerator::generate(IdType::Driver)
}
