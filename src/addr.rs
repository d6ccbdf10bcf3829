/// Split an lsof name token such as `127.0.0.1:3000 (LISTEN)`,
/// `*:8080`, `[::1]:5432` or `::1:53` into address and port.
///
/// The split is on the last colon so bare IPv6 addresses survive without
/// an address grammar. Tokens describing a connected peer (`a:1->b:2`)
/// are not listening sockets and yield nothing.
pub fn decode(token: &str) -> Option<(String, u16)> {
    if token.contains("->") {
        return None;
    }

    let token = token.split(' ').next()?.trim();
    let split = token.rfind(':').filter(|&n| n > 0)?;

    let (addr, port) = (&token[..split], &token[split + 1..]);
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let port = port.parse().ok()?;

    let addr = match addr.strip_prefix('[').and_then(|a| a.strip_suffix(']')) {
        Some(inner) if !inner.is_empty() => inner,
        _                                => addr,
    };

    Some((addr.to_owned(), port))
}
