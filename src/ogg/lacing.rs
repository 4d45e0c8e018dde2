/// Reads one Xiph lacing value from the start of `data`.
///
/// Bytes are summed while they equal 255; the first byte below 255 ends the value. Returns the
/// value together with the number of bytes it occupied, or `None` if `data` ends first.
pub fn read_lacing_value(data: &[u8]) -> Option<(usize, usize)> {
    let mut value = 0;
    for (index, &byte) in data.iter().enumerate() {
        value += byte as usize;
        if byte < 255 {
            return Some((value, index + 1));
        }
    }
    None
}

/// Reads `count` consecutive lacing values.
pub fn read_lacing_values(data: &[u8], count: usize) -> Option<(Vec<usize>, usize)> {
    let mut values = Vec::with_capacity(count);
    let mut consumed = 0;
    for _ in 0..count {
        let (value, len) = read_lacing_value(&data[consumed..])?;
        values.push(value);
        consumed += len;
    }
    Some((values, consumed))
}
