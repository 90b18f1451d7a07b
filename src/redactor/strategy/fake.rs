//! Fake strategy - replace values with generated look-alikes.

use super::Strategy;
use crate::record::Value;
use fake::faker::address::en::{CityName, StateName, StreetName, ZipCode};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::{SafeEmail, Username};
use fake::faker::lorem::en::Sentence;
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::str::FromStr;

/// Kind of value a [`FakeStrategy`] produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeGenerator {
    Name,
    FirstName,
    LastName,
    Email,
    Phone,
    Username,
    Address,
    City,
    Zip,
    Company,
    Uuid,
    Date,
    Ip,
    Sentence,
}

impl FakeGenerator {
    pub const ALL: [FakeGenerator; 14] = [
        FakeGenerator::Name,
        FakeGenerator::FirstName,
        FakeGenerator::LastName,
        FakeGenerator::Email,
        FakeGenerator::Phone,
        FakeGenerator::Username,
        FakeGenerator::Address,
        FakeGenerator::City,
        FakeGenerator::Zip,
        FakeGenerator::Company,
        FakeGenerator::Uuid,
        FakeGenerator::Date,
        FakeGenerator::Ip,
        FakeGenerator::Sentence,
    ];

    /// Name used for this generator in configuration files
    pub fn name(self) -> &'static str {
        match self {
            FakeGenerator::Name => "name",
            FakeGenerator::FirstName => "first_name",
            FakeGenerator::LastName => "last_name",
            FakeGenerator::Email => "email",
            FakeGenerator::Phone => "phone",
            FakeGenerator::Username => "username",
            FakeGenerator::Address => "address",
            FakeGenerator::City => "city",
            FakeGenerator::Zip => "zip",
            FakeGenerator::Company => "company",
            FakeGenerator::Uuid => "uuid",
            FakeGenerator::Date => "date",
            FakeGenerator::Ip => "ip",
            FakeGenerator::Sentence => "sentence",
        }
    }

    fn generate(self, rng: &mut StdRng) -> String {
        match self {
            FakeGenerator::Name => Name().fake_with_rng(rng),
            FakeGenerator::FirstName => FirstName().fake_with_rng(rng),
            FakeGenerator::LastName => LastName().fake_with_rng(rng),
            FakeGenerator::Email => SafeEmail().fake_with_rng(rng),
            FakeGenerator::Phone => PhoneNumber().fake_with_rng(rng),
            FakeGenerator::Username => Username().fake_with_rng(rng),
            FakeGenerator::Address => {
                let street: String = StreetName().fake_with_rng(rng);
                let city: String = CityName().fake_with_rng(rng);
                let state: String = StateName().fake_with_rng(rng);
                let zip: String = ZipCode().fake_with_rng(rng);
                format!("{}, {}, {} {}", street, city, state, zip)
            }
            FakeGenerator::City => CityName().fake_with_rng(rng),
            FakeGenerator::Zip => ZipCode().fake_with_rng(rng),
            FakeGenerator::Company => CompanyName().fake_with_rng(rng),
            FakeGenerator::Uuid => format!(
                "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
                rng.random::<u32>(),
                rng.random::<u16>(),
                rng.random::<u16>() & 0x0FFF,
                (rng.random::<u16>() & 0x3FFF) | 0x8000,
                rng.random::<u64>() & 0xFFFF_FFFF_FFFF
            ),
            FakeGenerator::Date => format!(
                "{:04}-{:02}-{:02}",
                rng.random_range(1970..2024),
                rng.random_range(1..=12),
                rng.random_range(1..=28)
            ),
            FakeGenerator::Ip => format!(
                "{}.{}.{}.{}",
                rng.random_range(1..255),
                rng.random_range(0..255),
                rng.random_range(0..255),
                rng.random_range(1..255)
            ),
            FakeGenerator::Sentence => Sentence(4..8).fake_with_rng(rng),
        }
    }
}

impl fmt::Display for FakeGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FakeGenerator {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|generator| generator.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|g| g.name()).collect();
                anyhow::anyhow!("Unknown fake generator: {}. Use one of: {}", s, known.join(", "))
            })
    }
}

/// Strategy that generates fake data
#[derive(Debug, Clone)]
pub struct FakeStrategy {
    generator: FakeGenerator,
}

impl FakeStrategy {
    pub fn new(generator: FakeGenerator) -> Self {
        Self { generator }
    }
}

impl Strategy for FakeStrategy {
    fn apply(&self, value: &Value, rng: &mut dyn rand::RngCore) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        // fake wants a sized Rng
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Value::Text(self.generator.generate(&mut StdRng::from_seed(seed)))
    }
}
