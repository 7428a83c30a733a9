use tracing::*;

use kernel::prelude::{AttributeDescription, EntrySearcher, Filter, SearchRequest};

/// Scans the whole store for values of `attribute` and returns the largest
/// one, or 0 when there are none. Enumeration failures are logged and
/// treated as an empty store.
pub fn collect_max(searcher: &dyn EntrySearcher, attribute: &AttributeDescription) -> u64 {
    let request = SearchRequest::everywhere(Filter::present(attribute.name()))
        .only(&[attribute.name()]);

    let mut max: u64 = 0;
    let mut entries: usize = 0;
    let scanned = searcher.search(&request, &mut |entry| {
        entries += 1;

        for found in entry.attributes().iter().filter(|a| attribute.matches(a.name())) {
            for value in found.values() {
                let observed = match parse_identifier(value) {
                    Some(observed) => observed,
                    None => {
                        debug!(dn = %entry.dn(), %value, "malformed {}", attribute);
                        0
                    }
                };

                trace!(dn = %entry.dn(), observed, "candidate");

                max = max.max(observed);
            }
        }

        Ok(())
    });

    match scanned {
        Ok(()) => {
            debug!(entries, max, "scanned");

            max
        }
        Err(e) => {
            error!("scanning for {} failed: {:?}", attribute, e);

            0
        }
    }
}

/// Reads an unsigned integer the way `strtoul(value, NULL, 0)` does: leading
/// whitespace and `+` are skipped, `0x` selects hex and a leading `0` octal,
/// and the longest run of valid digits is used. No digits, a minus sign or
/// overflow yield `None`.
pub fn parse_identifier(value: &str) -> Option<u64> {
    let trimmed = value.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == '\x0b');
    let unsigned = match trimmed.as_bytes().first() {
        Some(b'-') => return None,
        Some(b'+') => &trimmed[1..],
        _ => trimmed,
    };

    let (radix, digits) = match unsigned.as_bytes() {
        [b'0', b'x' | b'X', next, ..] if next.is_ascii_hexdigit() => (16, &unsigned[2..]),
        [b'0', ..] => (8, unsigned),
        _ => (10, unsigned),
    };

    let mut parsed: Option<u64> = None;
    for c in digits.chars() {
        let Some(digit) = c.to_digit(radix) else {
            break;
        };

        parsed = Some(
            parsed
                .unwrap_or(0)
                .checked_mul(radix as u64)?
                .checked_add(digit as u64)?,
        );
    }

    parsed
}
