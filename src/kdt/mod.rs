pub mod container;
pub mod cursor;
pub mod opcode;

/// Assemble a KDT1 file from raw track streams.
#[cfg(test)]
pub(crate) fn build_kdt(tick_div: u16, tracks: &[&[u8]]) -> Vec<u8> {
    let table_end = container::KDT_HEADER_SIZE + tracks.len() * 2;
    let size = table_end + tracks.iter().map(|t| t.len()).sum::<usize>();

    let mut bytes = Vec::with_capacity(size);
    bytes.extend_from_slice(container::KDT_MAGIC);
    bytes.extend_from_slice(&(size as u32).to_le_bytes());
    bytes.extend_from_slice(&tick_div.to_le_bytes());
    bytes.extend_from_slice(&[0, 0]);
    bytes.extend_from_slice(&(tracks.len() as u16).to_le_bytes());
    bytes.extend_from_slice(&[0, 0]);

    for track in tracks {
        bytes.extend_from_slice(&(track.len() as u16).to_le_bytes());
    }
    for track in tracks {
        bytes.extend_from_slice(track);
    }

    bytes
}
