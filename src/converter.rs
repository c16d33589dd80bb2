//! Conversion of structured (Clash-style YAML) configs into descriptors.
//!
//! The document is walked as a tree of mappings, sequences and scalars. Every
//! mapping that looks like a proxy definition is converted on its own, and the
//! walk always continues into its children, so nested proxies are found too.

use base64::engine::general_purpose;
use base64::Engine;
use serde::Serialize;
use serde_yaml::{Mapping, Value as YamlValue};
use tracing::debug;

use crate::descriptor::{is_descriptor, Scheme};
use crate::error::SieveError;

/// Keys whose presence marks a mapping as a proxy definition (two are enough).
const PROXY_INDICATORS: &[&str] = &["type", "server", "port", "name"];

const DEFAULT_SS_CIPHER: &str = "chacha20-ietf-poly1305";

/// Parse YAML text and convert every proxy node found in it.
///
/// Merge keys (`<<: *anchor`) are expanded first.
pub fn convert_str(text: &str) -> Result<Vec<String>, SieveError> {
    let mut document: YamlValue = serde_yaml::from_str(text)
        .map_err(|e| SieveError::Decode(format!("Invalid structured config: {}", e)))?;
    document
        .apply_merge()
        .map_err(|e| SieveError::Decode(format!("Invalid merge key: {}", e)))?;
    Ok(convert(&document))
}

/// Convert a parsed document into descriptors, in document order.
pub fn convert(document: &YamlValue) -> Vec<String> {
    let mut out = Vec::new();
    walk(document, &mut out);
    out.retain(|d| is_descriptor(d));
    out
}

fn walk(value: &YamlValue, out: &mut Vec<String>) {
    match value {
        YamlValue::Mapping(map) => {
            let node = ProxyNode(map);
            if node.is_proxy() {
                match node.to_descriptor() {
                    Some(descriptor) => out.push(descriptor),
                    None => debug!(
                        "Skipping proxy node {:?}: not convertible",
                        node.str("name").unwrap_or_default()
                    ),
                }
            }
            for child in map.values() {
                walk(child, out);
            }
        }
        YamlValue::Sequence(seq) => {
            for child in seq {
                walk(child, out);
            }
        }
        YamlValue::Tagged(tagged) => walk(&tagged.value, out),
        _ => {}
    }
}

/// Proxy kinds the converter can encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProxyKind {
    Vmess,
    Vless,
    Trojan,
    Shadowsocks,
    ShadowsocksR,
    Tuic,
    Hysteria { v2: bool },
}

impl ProxyKind {
    fn from_type(type_name: &str) -> Option<Self> {
        match type_name.to_ascii_lowercase().as_str() {
            "vmess" => Some(Self::Vmess),
            "vless" => Some(Self::Vless),
            "trojan" => Some(Self::Trojan),
            "ss" | "shadowsocks" => Some(Self::Shadowsocks),
            "ssr" | "shadowsocksr" => Some(Self::ShadowsocksR),
            "tuic" => Some(Self::Tuic),
            "hysteria" => Some(Self::Hysteria { v2: false }),
            "hysteria2" | "hy2" => Some(Self::Hysteria { v2: true }),
            _ => None,
        }
    }
}

/// Which distinguishing fields a node carries.
///
/// Used to guess the kind of a node whose `type` is missing or unknown. This
/// is best effort: a node matching none of the rules produces nothing.
#[derive(Debug, Default)]
struct Capabilities {
    uuid: bool,
    security: bool,
    password: bool,
    sni: bool,
    cipher: bool,
}

impl Capabilities {
    fn infer(&self) -> Option<ProxyKind> {
        if self.uuid && self.security {
            Some(ProxyKind::Vless)
        } else if self.password && self.sni {
            Some(ProxyKind::Trojan)
        } else if self.cipher && self.password {
            Some(ProxyKind::Shadowsocks)
        } else {
            None
        }
    }
}

/// Read-only view of a mapping that may describe a proxy.
struct ProxyNode<'a>(&'a Mapping);

impl<'a> ProxyNode<'a> {
    fn get(&self, key: &str) -> Option<&'a YamlValue> {
        self.0.get(key)
    }

    fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Scalar field rendered as text. Sequences of scalars are comma-joined.
    fn str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(scalar)
    }

    fn str_or(&self, key: &str, default: &str) -> String {
        self.str(key).unwrap_or_else(|| default.to_string())
    }

    /// Non-empty scalar field.
    fn non_empty(&self, key: &str) -> Option<String> {
        self.str(key).filter(|s| !s.is_empty())
    }

    fn flag(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(truthy)
    }

    fn tls_enabled(&self) -> bool {
        self.flag("tls").unwrap_or(false) || self.flag("ssl").unwrap_or(false)
    }

    fn nested(&self, outer: &str, path: &[&str]) -> Option<String> {
        let mut value = self.get(outer)?;
        for key in path {
            value = value.get(*key)?;
        }
        scalar(value)
    }

    fn ws_path(&self) -> Option<String> {
        self.str("path").or_else(|| self.nested("ws-opts", &["path"]))
    }

    fn ws_host(&self) -> Option<String> {
        self.str("host")
            .or_else(|| self.nested("ws-opts", &["headers", "Host"]))
    }

    fn grpc_service_name(&self) -> Option<String> {
        self.str("serviceName")
            .or_else(|| self.nested("grpc-opts", &["grpc-service-name"]))
    }

    fn name_or(&self, default: &str) -> String {
        self.str_or("name", default)
    }

    fn is_proxy(&self) -> bool {
        let known_type = self
            .str("type")
            .is_some_and(|t| t.parse::<Scheme>().is_ok());
        if known_type {
            return true;
        }
        PROXY_INDICATORS.iter().filter(|key| self.has(key)).count() >= 2
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            uuid: self.has("uuid"),
            security: self.has("security"),
            password: self.has("password"),
            sni: self.has("sni"),
            cipher: self.has("cipher"),
        }
    }

    fn kind(&self) -> Option<ProxyKind> {
        self.str("type")
            .and_then(|t| ProxyKind::from_type(&t))
            .or_else(|| self.capabilities().infer())
    }

    fn to_descriptor(&self) -> Option<String> {
        match self.kind()? {
            ProxyKind::Vmess => self.vmess(),
            ProxyKind::Vless => self.vless(),
            ProxyKind::Trojan => self.trojan(),
            ProxyKind::Shadowsocks => self.shadowsocks(),
            ProxyKind::ShadowsocksR => self.shadowsocksr(),
            ProxyKind::Tuic => self.tuic(),
            ProxyKind::Hysteria { v2 } => self.hysteria(v2),
        }
    }

    fn vmess(&self) -> Option<String> {
        let link = VmessLink {
            v: "2".to_string(),
            ps: self.name_or(""),
            add: self.str_or("server", ""),
            port: self.str_or("port", ""),
            id: self
                .str("uuid")
                .or_else(|| self.str("password"))
                .unwrap_or_default(),
            aid: self.str_or("alterId", "0"),
            scy: self.str_or("cipher", "auto"),
            net: self.str_or("network", "tcp"),
            header_type: "none".to_string(),
            host: self.ws_host().unwrap_or_default(),
            path: self.ws_path().unwrap_or_default(),
            tls: if self.tls_enabled() { "tls".to_string() } else { String::new() },
            sni: self
                .str("servername")
                .or_else(|| self.str("sni"))
                .unwrap_or_default(),
            alpn: self.str_or("alpn", ""),
            fp: self
                .str("fingerprint")
                .or_else(|| self.str("client-fingerprint"))
                .unwrap_or_else(|| "chrome".to_string()),
        };

        let json = match serde_json::to_string(&link) {
            Ok(json) => json,
            Err(e) => {
                debug!("Failed to encode vmess node: {}", e);
                return None;
            }
        };
        Some(format!("vmess://{}", general_purpose::STANDARD.encode(json)))
    }

    fn vless(&self) -> Option<String> {
        let server = self.non_empty("server")?;
        let port = self.non_empty("port")?;
        let id = self
            .str("uuid")
            .or_else(|| self.str("password"))
            .filter(|s| !s.is_empty())?;

        let network = self.str_or("network", "tcp");
        let mut params = vec![format!("type={}", network)];

        if self.tls_enabled() {
            params.push("security=tls".to_string());
            if let Some(sni) = self.str("servername") {
                params.push(format!("sni={}", sni));
            }
        } else {
            params.push("security=none".to_string());
        }

        match network.as_str() {
            "ws" => push_ws_params(self, &mut params),
            "grpc" => {
                if let Some(service) = self.grpc_service_name() {
                    params.push(format!("serviceName={}", service));
                }
            }
            _ => {}
        }

        if let Some(flow) = self.str("flow") {
            params.push(format!("flow={}", flow));
        }

        Some(format!(
            "vless://{}@{}:{}?{}#{}",
            id,
            server,
            port,
            params.join("&"),
            self.name_or("VLESS Config")
        ))
    }

    fn trojan(&self) -> Option<String> {
        let server = self.non_empty("server")?;
        let port = self.non_empty("port")?;
        let password = self
            .str("password")
            .or_else(|| self.str("uuid"))
            .filter(|s| !s.is_empty())?;

        let mut params = Vec::new();
        if self.flag("tls").unwrap_or(true) {
            params.push("security=tls".to_string());
            if let Some(sni) = self.str("sni").or_else(|| self.str("servername")) {
                params.push(format!("sni={}", sni));
            }
        } else {
            params.push("security=none".to_string());
        }

        let network = self.str_or("network", "tcp");
        params.push(format!("type={}", network));
        if network == "ws" {
            push_ws_params(self, &mut params);
        }

        Some(format!(
            "trojan://{}@{}:{}?{}#{}",
            password,
            server,
            port,
            params.join("&"),
            self.name_or("Trojan Config")
        ))
    }

    fn shadowsocks(&self) -> Option<String> {
        let server = self.non_empty("server")?;
        let port = self.non_empty("port")?;
        let password = self.non_empty("password")?;
        let cipher = Some(self.str_or("cipher", DEFAULT_SS_CIPHER)).filter(|c| !c.is_empty())?;

        let credentials = general_purpose::STANDARD.encode(format!("{}:{}", cipher, password));
        Some(format!(
            "ss://{}@{}:{}#{}",
            credentials,
            server,
            port,
            self.name_or("Shadowsocks Config")
        ))
    }

    fn shadowsocksr(&self) -> Option<String> {
        let server = self.non_empty("server")?;
        let port = self.non_empty("port")?;
        let password = self.non_empty("password")?;
        let cipher = Some(self.str_or("cipher", DEFAULT_SS_CIPHER)).filter(|c| !c.is_empty())?;
        let protocol = self.str_or("protocol", "origin");
        let obfs = self.str_or("obfs", "plain");

        let mut query = Vec::new();
        if let Some(name) = self.str("name") {
            query.push(format!("remarks={}", general_purpose::STANDARD.encode(name)));
        }

        Some(format!(
            "ssr://{}:{}:{}:{}:{}:{}/?{}",
            server,
            port,
            protocol,
            cipher,
            obfs,
            general_purpose::STANDARD.encode(password),
            query.join("&")
        ))
    }

    fn tuic(&self) -> Option<String> {
        let server = self.non_empty("server")?;
        let port = self.non_empty("port")?;
        let uuid = self.non_empty("uuid")?;

        let mut params = vec!["security=tls".to_string()];
        if let Some(sni) = self.str("sni") {
            params.push(format!("sni={}", sni));
        }
        if let Some(mode) = self
            .str("udp_relay_mode")
            .or_else(|| self.str("udp-relay-mode"))
        {
            params.push(format!("udp={}", mode));
        }
        if let Some(cc) = self
            .str("congestion_control")
            .or_else(|| self.str("congestion-controller"))
        {
            params.push(format!("congestion_control={}", cc));
        }

        let auth = match self.non_empty("password") {
            Some(password) => format!("{}:{}", uuid, password),
            None => uuid,
        };

        Some(format!(
            "tuic://{}@{}:{}?{}#{}",
            auth,
            server,
            port,
            params.join("&"),
            self.name_or("TUIC Config")
        ))
    }

    fn hysteria(&self, v2: bool) -> Option<String> {
        let server = self.non_empty("server")?;
        let port = self.non_empty("port")?;

        let mut params = Vec::new();
        if let Some(auth) = self
            .str("auth_str")
            .or_else(|| self.str("auth-str"))
            .or_else(|| self.str("password"))
        {
            params.push(format!("auth={}", auth));
        }
        if let Some(sni) = self.str("sni") {
            params.push(format!("sni={}", sni));
        }
        if let Some(obfs) = self.str("obfs") {
            params.push(format!("obfs={}", obfs));
        }
        if let Some(up) = self.str("up_mbps").or_else(|| self.str("up")) {
            params.push(format!("upmbps={}", up));
        }
        if let Some(down) = self.str("down_mbps").or_else(|| self.str("down")) {
            params.push(format!("downmbps={}", down));
        }
        if v2 {
            params.push("type=webtransport".to_string());
        }

        Some(format!(
            "hysteria2://{}:{}?{}#{}",
            server,
            port,
            params.join("&"),
            self.name_or("Hysteria Config")
        ))
    }
}

fn push_ws_params(node: &ProxyNode<'_>, params: &mut Vec<String>) {
    if let Some(path) = node.ws_path() {
        params.push(format!("path={}", path));
    }
    if let Some(host) = node.ws_host() {
        params.push(format!("host={}", host));
    }
}

/// vmess share-link JSON. Field order is the wire order; empty fields are dropped.
#[derive(Serialize)]
struct VmessLink {
    #[serde(skip_serializing_if = "String::is_empty")]
    v: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    ps: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    add: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    port: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    aid: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    scy: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    net: String,
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    header_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    host: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    tls: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    sni: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    alpn: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    fp: String,
}

fn scalar(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        YamlValue::Sequence(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar).collect();
            Some(parts.join(","))
        }
        _ => None,
    }
}

fn truthy(value: &YamlValue) -> Option<bool> {
    match value {
        YamlValue::Bool(b) => Some(*b),
        YamlValue::Number(n) => Some(n.as_f64().is_some_and(|f| f != 0.0)),
        YamlValue::String(s) => Some(matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )),
        _ => None,
    }
}
