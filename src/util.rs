use std::net::IpAddr;

use serde::{Deserialize, Deserializer, Serializer};

/// Field codec for addresses that may be unset. The configuration document
/// encodes an unknown last address as the empty string, so `""` maps to
/// `None` and anything non-empty must parse as an IPv4 or IPv6 literal.
///
/// Use with `#[serde(with = "ip_or_empty")]`.
pub(super) mod ip_or_empty {
    use super::*;

    pub fn serialize<S>(ip: &Option<IpAddr>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match ip {
            Some(ip) => serializer.collect_str(ip),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<IpAddr>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;

        if raw.is_empty() {
            return Ok(None);
        }

        raw.parse::<IpAddr>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("\"{}\" is not an IP address", raw)))
    }
}

/// Field codec for JSON objects whose entry order matters. The object is
/// read into a vector of pairs, so iterating it follows the document rather
/// than a sort order. A key given twice keeps its first position and the
/// last value, the way a plain map load would end up with.
///
/// Use with `#[serde(with = "ordered_map")]` on a `Vec<(K, V)>` field.
pub(super) mod ordered_map {
    use std::fmt;
    use std::marker::PhantomData;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, K, V>(entries: &[(K, V)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        K: Serialize,
        V: Serialize,
    {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D, K, V>(deserializer: D) -> Result<Vec<(K, V)>, D::Error>
    where
        D: Deserializer<'de>,
        K: Deserialize<'de> + PartialEq,
        V: Deserialize<'de>,
    {
        struct OrderedVisitor<K, V>(PhantomData<(K, V)>);

        impl<'de, K, V> Visitor<'de> for OrderedVisitor<K, V>
        where
            K: Deserialize<'de> + PartialEq,
            V: Deserialize<'de>,
        {
            type Value = Vec<(K, V)>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries: Vec<(K, V)> =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));

                while let Some((key, value)) = access.next_entry::<K, V>()? {
                    match entries.iter_mut().find(|(existing, _)| *existing == key) {
                        Some((_, slot)) => *slot = value,
                        None => entries.push((key, value)),
                    }
                }

                Ok(entries)
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}
