//! Typed views over the account snapshot

use ha_core::util::title_case;
use serde_json::Value;

fn str_at<'a>(data: &'a Value, pointer: &str) -> Option<&'a str> {
    data.pointer(pointer).and_then(Value::as_str)
}

fn bool_at(data: &Value, pointer: &str) -> Option<bool> {
    data.pointer(pointer).and_then(Value::as_bool)
}

fn list<'a>(data: &'a Value, pointer: &str) -> impl Iterator<Item = &'a Value> {
    data.pointer(pointer)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

#[derive(Debug, Clone, Copy)]
pub struct Account<'a> {
    data: &'a Value,
}

impl<'a> Account<'a> {
    pub fn new(data: &'a Value) -> Self {
        Self { data }
    }

    pub fn name(&self) -> Option<&'a str> {
        str_at(self.data, "/name")
    }

    pub fn email(&self) -> Option<&'a str> {
        str_at(self.data, "/email/value")
    }

    pub fn phone(&self) -> Option<&'a str> {
        str_at(self.data, "/phone/value")
    }

    pub fn log_id(&self) -> Option<&'a str> {
        str_at(self.data, "/log_id")
    }

    pub fn premium_status(&self) -> Option<&'a str> {
        str_at(self.data, "/premium_status")
    }

    pub fn networks(&self) -> Vec<Network<'a>> {
        list(self.data, "/networks/data").map(Network::new).collect()
    }

    pub fn network(&self, id: &str) -> Option<Network<'a>> {
        self.networks().into_iter().find(|n| n.id() == id)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Network<'a> {
    data: &'a Value,
}

/// A measured speed: value, units and test date
#[derive(Debug, Clone, PartialEq)]
pub struct Speed {
    pub value: Option<f64>,
    pub units: Option<String>,
}

impl<'a> Network<'a> {
    pub fn new(data: &'a Value) -> Self {
        Self { data }
    }

    pub fn url(&self) -> &'a str {
        str_at(self.data, "/url").unwrap_or_default()
    }

    pub fn id(&self) -> &'a str {
        crate::api::parse_network_id(self.url())
    }

    pub fn name(&self) -> &'a str {
        str_at(self.data, "/name").unwrap_or_default()
    }

    pub fn status(&self) -> Option<&'a str> {
        str_at(self.data, "/status")
    }

    pub fn public_ip(&self) -> Option<&'a str> {
        str_at(self.data, "/ip_settings/public_ip")
    }

    pub fn premium_enabled(&self) -> bool {
        str_at(self.data, "/premium_status") == Some("active")
    }

    pub fn ad_block(&self) -> Option<bool> {
        bool_at(self.data, "/premium_dns/dns_policies/ad_block")
    }

    pub fn block_malware(&self) -> Option<bool> {
        bool_at(self.data, "/premium_dns/dns_policies/block_malware")
    }

    pub fn speed_down(&self) -> Speed {
        self.speed("down")
    }

    pub fn speed_up(&self) -> Speed {
        self.speed("up")
    }

    fn speed(&self, direction: &str) -> Speed {
        Speed {
            value: self
                .data
                .pointer(&format!("/speed/{}/value", direction))
                .and_then(Value::as_f64),
            units: str_at(self.data, &format!("/speed/{}/units", direction)).map(String::from),
        }
    }

    pub fn speed_date(&self) -> Option<&'a str> {
        str_at(self.data, "/speed/date")
    }

    pub fn guest_network_enabled(&self) -> Option<bool> {
        bool_at(self.data, "/guest_network/enabled")
    }

    pub fn guest_network_name(&self) -> Option<&'a str> {
        str_at(self.data, "/guest_network/name")
    }

    pub fn target_firmware(&self) -> Option<&'a str> {
        str_at(self.data, "/updates/target_firmware")
    }

    pub fn clients_count(&self) -> Option<u64> {
        self.data.pointer("/clients/count").and_then(Value::as_u64)
    }

    pub fn health_internet_status(&self) -> Option<&'a str> {
        str_at(self.data, "/health/internet/status")
    }

    pub fn health_internet_isp_up(&self) -> Option<bool> {
        bool_at(self.data, "/health/internet/isp_up")
    }

    pub fn health_eero_network_status(&self) -> Option<&'a str> {
        str_at(self.data, "/health/eero_network/status")
    }

    pub fn eeros(&self) -> Vec<Eero<'a>> {
        list(self.data, "/eeros/data").map(Eero::new).collect()
    }

    pub fn profiles(&self) -> Vec<Profile<'a>> {
        list(self.data, "/profiles/data")
            .map(|data| Profile::new(*self, data))
            .collect()
    }

    pub fn clients(&self) -> Vec<Client<'a>> {
        list(self.data, "/devices/data")
            .map(|data| Client::new(*self, data))
            .collect()
    }

    /// Find an eero, profile or client of this network by id
    pub fn resource(&self, id: &str) -> Option<Resource<'a>> {
        self.eeros()
            .into_iter()
            .find(|e| e.id() == id)
            .map(Resource::Eero)
            .or_else(|| {
                self.profiles()
                    .into_iter()
                    .find(|p| p.id() == id)
                    .map(Resource::Profile)
            })
            .or_else(|| {
                self.clients()
                    .into_iter()
                    .find(|c| c.id() == id)
                    .map(Resource::Client)
            })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Eero<'a> {
    data: &'a Value,
}

impl<'a> Eero<'a> {
    pub fn new(data: &'a Value) -> Self {
        Self { data }
    }

    pub fn url(&self) -> &'a str {
        str_at(self.data, "/url").unwrap_or_default()
    }

    pub fn id(&self) -> &'a str {
        self.url().trim_start_matches("/2.2/eeros/")
    }

    /// eeros are named after their location
    pub fn name(&self) -> &'a str {
        str_at(self.data, "/location").unwrap_or_default()
    }

    pub fn model(&self) -> Option<&'a str> {
        str_at(self.data, "/model")
    }

    pub fn is_beacon(&self) -> bool {
        self.model().is_some_and(|m| m.contains("Beacon"))
    }

    pub fn os_version(&self) -> Option<&'a str> {
        str_at(self.data, "/os_version")
    }

    pub fn is_gateway(&self) -> bool {
        bool_at(self.data, "/gateway").unwrap_or(false)
    }

    pub fn status(&self) -> Option<&'a str> {
        str_at(self.data, "/status")
    }

    pub fn serial(&self) -> Option<&'a str> {
        str_at(self.data, "/serial")
    }

    pub fn update_available(&self) -> Option<bool> {
        bool_at(self.data, "/update_available")
    }

    pub fn led_on(&self) -> Option<bool> {
        bool_at(self.data, "/led_on")
    }

    pub fn connected_clients_count(&self) -> Option<u64> {
        self.data
            .pointer("/connected_clients_count")
            .and_then(Value::as_u64)
    }

    /// Scheduled nightlight `(on, off)` times
    pub fn nightlight_schedule(&self) -> (Option<&'a str>, Option<&'a str>) {
        (
            str_at(self.data, "/nightlight/schedule/on"),
            str_at(self.data, "/nightlight/schedule/off"),
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Profile<'a> {
    network: Network<'a>,
    data: &'a Value,
}

impl<'a> Profile<'a> {
    pub fn new(network: Network<'a>, data: &'a Value) -> Self {
        Self { network, data }
    }

    pub fn id(&self) -> &'a str {
        let url = str_at(self.data, "/url").unwrap_or_default();
        url.rsplit('/').next().unwrap_or(url)
    }

    pub fn name(&self) -> &'a str {
        str_at(self.data, "/name").unwrap_or_default()
    }

    pub fn network(&self) -> Network<'a> {
        self.network
    }

    pub fn paused(&self) -> Option<bool> {
        bool_at(self.data, "/paused")
    }

    /// A content filter flag under `premium_dns.dns_policies`
    pub fn dns_policy(&self, policy: &str) -> Option<bool> {
        bool_at(
            self.data,
            &format!("/premium_dns/dns_policies/{}", policy),
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Client<'a> {
    network: Network<'a>,
    data: &'a Value,
}

impl<'a> Client<'a> {
    pub fn new(network: Network<'a>, data: &'a Value) -> Self {
        Self { network, data }
    }

    pub fn id(&self) -> &'a str {
        let url = str_at(self.data, "/url").unwrap_or_default();
        url.rsplit('/').next().unwrap_or(url)
    }

    pub fn network(&self) -> Network<'a> {
        self.network
    }

    /// Nickname, then hostname, then MAC address
    pub fn name(&self) -> &'a str {
        self.nickname()
            .or_else(|| self.hostname())
            .or_else(|| self.mac())
            .unwrap_or_default()
    }

    pub fn name_mac(&self) -> String {
        format!("{} ({})", self.name(), self.mac().unwrap_or_default())
    }

    pub fn name_connection_type(&self) -> String {
        format!(
            "{} ({})",
            self.name(),
            title_case(self.connection_type().unwrap_or_default())
        )
    }

    pub fn nickname(&self) -> Option<&'a str> {
        str_at(self.data, "/nickname").filter(|s| !s.is_empty())
    }

    pub fn hostname(&self) -> Option<&'a str> {
        str_at(self.data, "/hostname").filter(|s| !s.is_empty())
    }

    pub fn mac(&self) -> Option<&'a str> {
        str_at(self.data, "/mac")
    }

    pub fn manufacturer(&self) -> Option<&'a str> {
        str_at(self.data, "/manufacturer")
    }

    pub fn ip(&self) -> Option<&'a str> {
        str_at(self.data, "/ip")
    }

    pub fn connected(&self) -> Option<bool> {
        bool_at(self.data, "/connected")
    }

    pub fn wireless(&self) -> bool {
        bool_at(self.data, "/wireless").unwrap_or(false)
    }

    pub fn is_private(&self) -> Option<bool> {
        bool_at(self.data, "/is_private")
    }

    pub fn device_type(&self) -> Option<&'a str> {
        str_at(self.data, "/device_type")
    }

    pub fn connection_type(&self) -> Option<&'a str> {
        str_at(self.data, "/connection_type")
    }

    pub fn source_location(&self) -> Option<&'a str> {
        str_at(self.data, "/source/location")
    }

    pub fn paused(&self) -> Option<bool> {
        bool_at(self.data, "/paused")
    }
}

/// Anything an entity can be attached to
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    Network(Network<'a>),
    Eero(Eero<'a>),
    Profile(Profile<'a>),
    Client(Client<'a>),
}

/// Kind of a [`Resource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Network,
    Eero,
    Profile,
    Client,
}

impl<'a> Resource<'a> {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Network(_) => ResourceKind::Network,
            Resource::Eero(_) => ResourceKind::Eero,
            Resource::Profile(_) => ResourceKind::Profile,
            Resource::Client(_) => ResourceKind::Client,
        }
    }

    pub fn id(&self) -> &'a str {
        match self {
            Resource::Network(n) => n.id(),
            Resource::Eero(e) => e.id(),
            Resource::Profile(p) => p.id(),
            Resource::Client(c) => c.id(),
        }
    }

    /// Boolean state of a switch or binary sensor variable
    pub fn flag(&self, variable: &str) -> Option<bool> {
        match (self, variable) {
            (Resource::Network(n), "guest_network_enabled") => n.guest_network_enabled(),
            (Resource::Network(n), "ad_block") => n.ad_block(),
            (Resource::Network(n), "block_malware") => n.block_malware(),
            (Resource::Eero(e), "led_on") => e.led_on(),
            (Resource::Eero(e), "update_available") => e.update_available(),
            (Resource::Profile(p), "paused") => p.paused(),
            (Resource::Profile(p), policy) => p.dns_policy(policy),
            (Resource::Client(c), "paused") => c.paused(),
            _ => None,
        }
    }
}
