/*!
Channel definitions for the Configurable service.

The Configurable service streams nothing until the client sends one XML
message naming the channels it wants, grouped by source service:

```xml
<?xml version="1.0"?><configurable><preview><Gq/></preview><sensor><a/></sensor></configurable>
```

Each sample then carries the requested channels in definition order.
*/

use crate::error::{MotionError, Result};
use crate::format::Service;

/// Ordered set of requested channels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSet {
    groups: Vec<(Service, Vec<String>)>,
}

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request channel `name` from `service`, duplicates are ignored
    pub fn insert(&mut self, service: Service, name: &str) -> Result<()> {
        if service == Service::Configurable {
            return Err(MotionError::protocol(
                "configurable channels must come from a source service",
            ));
        }
        if !is_channel_name(name) {
            return Err(MotionError::protocol(format!(
                "invalid channel name {:?}",
                name
            )));
        }

        let position = match self.groups.iter().position(|(s, _)| *s == service) {
            Some(position) => position,
            None => {
                self.groups.push((service, Vec::new()));
                self.groups.len() - 1
            }
        };

        let names = &mut self.groups[position].1;
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        Ok(())
    }

    /// Request every channel in `names` from `service`
    pub fn extend<I, S>(&mut self, service: Service, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.insert(service, name.as_ref())?;
        }
        Ok(())
    }

    /// Parse a `service.channel` entry, for example `sensor.a`
    pub fn insert_entry(&mut self, entry: &str) -> Result<()> {
        let (service, name) = entry.split_once('.').ok_or_else(|| {
            MotionError::protocol(format!("expected service.channel, got {:?}", entry))
        })?;
        let service = Service::from_name(service)
            .ok_or_else(|| MotionError::protocol(format!("unknown service {:?}", service)))?;
        self.insert(service, name)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of requested channels across all services
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, names)| names.len()).sum()
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\"?><configurable>");
        for (service, names) in &self.groups {
            let tag = group_tag(*service);
            xml.push('<');
            xml.push_str(tag);
            xml.push('>');
            for name in names {
                xml.push('<');
                xml.push_str(name);
                xml.push_str("/>");
            }
            xml.push_str("</");
            xml.push_str(tag);
            xml.push('>');
        }
        xml.push_str("</configurable>");
        xml
    }

    /// Message payload ready for `Connection::write_data`
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_xml().into_bytes()
    }
}

fn group_tag(service: Service) -> &'static str {
    match service {
        Service::Preview => "preview",
        Service::Sensor => "sensor",
        Service::Raw => "raw",
        Service::Configurable => "configurable",
    }
}

fn is_channel_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
