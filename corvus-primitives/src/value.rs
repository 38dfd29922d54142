use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;

use crate::Error;

/// The amount field of an output.
///
/// Either a concrete satoshi amount, or the "spend maximum" marker used
/// while sizing a transaction dynamically. Only the concrete arm can be
/// serialized; the marker must be resolved by the coin selector before a
/// transaction leaves the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OutputValue {
    Sats(u64),
    /// `max!`, or `max-N!` splitting the maximum across outputs by weight.
    MaxSpend(u64),
}

impl OutputValue {
    /// The concrete amount, or an error for dynamic markers.
    pub fn sats(&self) -> Result<u64, Error> {
        match self {
            OutputValue::Sats(v) => Ok(*v),
            OutputValue::MaxSpend(_) => Err(Error::NonConcreteValue),
        }
    }

    pub fn is_max_spend(&self) -> bool {
        matches!(self, OutputValue::MaxSpend(_))
    }
}

impl From<u64> for OutputValue {
    fn from(v: u64) -> Self {
        OutputValue::Sats(v)
    }
}

impl fmt::Display for OutputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputValue::Sats(v) => write!(f, "{v}"),
            OutputValue::MaxSpend(1) => write!(f, "max!"),
            OutputValue::MaxSpend(n) => write!(f, "max-{n}!"),
        }
    }
}

impl FromStr for OutputValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "max!" {
            return Ok(OutputValue::MaxSpend(1));
        }
        if let Some(weight) = s.strip_prefix("max-").and_then(|r| r.strip_suffix('!')) {
            let weight: u64 = weight
                .parse()
                .map_err(|_| Error::Codec(corvus_codec::Error::BadField("max-spend weight")))?;
            return Ok(OutputValue::MaxSpend(weight));
        }
        let sats: u64 = s
            .parse()
            .map_err(|_| Error::Codec(corvus_codec::Error::BadField("output value")))?;
        Ok(OutputValue::Sats(sats))
    }
}

/// A bundle of RVN satoshis plus per-asset satoshi amounts.
///
/// Inputs and outputs of asset-aware transactions are valued in this
/// bundle; fee arithmetic only ever touches the RVN component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RvnValue {
    pub rvn: u64,
    pub assets: BTreeMap<String, u64>,
}

impl RvnValue {
    pub fn from_sats(rvn: u64) -> Self {
        RvnValue {
            rvn,
            ..Default::default()
        }
    }

    pub fn from_asset(name: impl Into<String>, amount: u64) -> Self {
        let mut assets = BTreeMap::new();
        assets.insert(name.into(), amount);
        RvnValue { rvn: 0, assets }
    }

    pub fn is_zero(&self) -> bool {
        self.rvn == 0 && self.assets.values().all(|&v| v == 0)
    }

    /// Component-wise subtraction; `None` when any component would go
    /// negative.
    pub fn checked_sub(&self, other: &RvnValue) -> Option<RvnValue> {
        let rvn = self.rvn.checked_sub(other.rvn)?;
        let mut assets = self.assets.clone();
        for (name, amount) in &other.assets {
            let have = assets.entry(name.clone()).or_insert(0);
            *have = have.checked_sub(*amount)?;
        }
        assets.retain(|_, v| *v != 0);
        Some(RvnValue { rvn, assets })
    }
}

impl Add for RvnValue {
    type Output = RvnValue;

    fn add(mut self, other: RvnValue) -> RvnValue {
        self.rvn += other.rvn;
        for (name, amount) in other.assets {
            *self.assets.entry(name).or_insert(0) += amount;
        }
        self
    }
}

impl Sum for RvnValue {
    fn sum<I: Iterator<Item = RvnValue>>(iter: I) -> RvnValue {
        iter.fold(RvnValue::default(), Add::add)
    }
}

impl fmt::Display for RvnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat", self.rvn)?;
        for (name, amount) in &self.assets {
            write!(f, " + {amount} {name}")?;
        }
        Ok(())
    }
}
