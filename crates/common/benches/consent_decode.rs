//! Criterion benchmark: TCF v2 consent string decoding through `iab_gpp`.
//! Run with: cargo bench -p prebid-fanout-common --bench consent_decode

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use prebid_fanout_common::privacy::gdpr::TcfConsent;

struct BitWriter {
    bits: Vec<bool>,
}

impl BitWriter {
    fn push(&mut self, value: u64, width: usize) {
        for shift in (0..width).rev() {
            self.bits.push((value >> shift) & 1 == 1);
        }
    }

    fn zeros(&mut self, width: usize) {
        self.bits.resize(self.bits.len() + width, false);
    }

    fn finish(self) -> String {
        let bytes: Vec<u8> = self
            .bits
            .chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0u8, |byte, (i, &bit)| byte | (u8::from(bit) << (7 - i)))
            })
            .collect();
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

/// Core string consenting to purposes 1-10 and every `step`th vendor up to
/// `max_vendor_id`.
fn consent_string(max_vendor_id: u16, step: u16, range_encoding: bool) -> String {
    let mut writer = BitWriter { bits: Vec::new() };
    writer.push(2, 6);
    writer.zeros(146);
    writer.push(0xFFC000, 24);
    writer.zeros(37);
    writer.push(u64::from(max_vendor_id), 16);
    writer.push(u64::from(range_encoding), 1);

    let vendors: Vec<u16> = (1..=max_vendor_id).step_by(usize::from(step)).collect();
    if range_encoding {
        writer.push(vendors.len() as u64, 12);
        for vendor in vendors {
            writer.push(0, 1);
            writer.push(u64::from(vendor), 16);
        }
    } else {
        for id in 1..=max_vendor_id {
            writer.push(u64::from(vendors.contains(&id)), 1);
        }
    }
    // Vendor legitimate interests (none) and publisher restrictions (none).
    writer.zeros(16 + 1 + 12);
    writer.finish()
}

fn bench_consent_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("consent_decode");

    let bitfield = consent_string(1000, 3, false);
    group.bench_function("bitfield_1000_vendors", |b| {
        b.iter(|| TcfConsent::parse(black_box(&bitfield)).expect("valid consent"));
    });

    let ranges = consent_string(1000, 3, true);
    group.bench_function("ranges_334_entries", |b| {
        b.iter(|| TcfConsent::parse(black_box(&ranges)).expect("valid consent"));
    });

    let parsed = TcfConsent::parse(&ranges).expect("valid consent");
    group.bench_function("vendor_lookup_ranges", |b| {
        b.iter(|| parsed.vendor_consented(black_box(997)));
    });

    group.finish();
}

criterion_group!(benches, bench_consent_decode);
criterion_main!(benches);
