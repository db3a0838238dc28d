//! Removal of personal data from an outgoing bidder request.

use std::collections::BTreeSet;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::openrtb::{BidRequest, Device, Geo, User};

use super::PersonalDataField;

/// Strips `fields` from a bidder's own copy of the request.
#[must_use]
pub fn scrub_request(mut request: BidRequest, fields: &BTreeSet<PersonalDataField>) -> BidRequest {
    if fields.is_empty() {
        return request;
    }
    if let Some(user) = request.user.as_mut() {
        scrub_user(user, fields);
    }
    if let Some(device) = request.device.as_mut() {
        scrub_device(device, fields);
    }
    request
}

fn scrub_user(user: &mut User, fields: &BTreeSet<PersonalDataField>) {
    if fields.contains(&PersonalDataField::BuyerUid) {
        user.buyeruid = None;
    }
    if fields.contains(&PersonalDataField::UserId) {
        user.id = None;
    }
    if fields.contains(&PersonalDataField::UserDemographics) {
        user.yob = None;
        user.gender = None;
    }
    if fields.contains(&PersonalDataField::Geo) {
        if let Some(geo) = user.geo.as_mut() {
            round_geo(geo);
        }
    }
}

fn scrub_device(device: &mut Device, fields: &BTreeSet<PersonalDataField>) {
    if fields.contains(&PersonalDataField::DeviceIds) {
        device.ifa = None;
        device.didsha1 = None;
        device.didmd5 = None;
        device.dpidsha1 = None;
        device.dpidmd5 = None;
        device.macsha1 = None;
        device.macmd5 = None;
    }
    if fields.contains(&PersonalDataField::DeviceIp) {
        device.ip = device.ip.as_deref().and_then(truncate_ipv4);
        device.ipv6 = device.ipv6.as_deref().and_then(truncate_ipv6);
    }
    if fields.contains(&PersonalDataField::Geo) {
        if let Some(geo) = device.geo.as_mut() {
            round_geo(geo);
        }
    }
}

/// Zeroes the last octet. Unparsable addresses are dropped.
fn truncate_ipv4(ip: &str) -> Option<String> {
    let ip: Ipv4Addr = ip.parse().ok()?;
    let [a, b, c, _] = ip.octets();
    Some(Ipv4Addr::new(a, b, c, 0).to_string())
}

/// Zeroes the lowest 32 bits. Unparsable addresses are dropped.
fn truncate_ipv6(ip: &str) -> Option<String> {
    let ip: Ipv6Addr = ip.parse().ok()?;
    let masked = u128::from(ip) & !u128::from(u32::MAX);
    Some(Ipv6Addr::from(masked).to_string())
}

fn round_geo(geo: &mut Geo) {
    let round = |value: f64| (value * 100.0).round() / 100.0;
    geo.lat = geo.lat.map(round);
    geo.lon = geo.lon.map(round);
}
