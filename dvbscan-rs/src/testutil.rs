//! Section builders for tests.

/// Wrap a payload into a long-form section with a zeroed CRC.
pub fn long_section(
    table_id: u8,
    table_id_ext: u16,
    version: u8,
    section_number: u8,
    last_section_number: u8,
    payload: &[u8],
) -> Vec<u8> {
    let section_length = (payload.len() + 9) as u16;
    let mut out = vec![
        table_id,
        0xB0 | ((section_length >> 8) as u8 & 0x0F),
        section_length as u8,
        (table_id_ext >> 8) as u8,
        table_id_ext as u8,
        0xC1 | ((version & 0x1F) << 1),
        section_number,
        last_section_number,
    ];
    out.extend_from_slice(payload);
    out.extend_from_slice(&[0, 0, 0, 0]);
    out
}

fn length_prefixed(out: &mut Vec<u8>, body: &[u8]) {
    out.push(0xF0 | (body.len() >> 8) as u8);
    out.push(body.len() as u8);
    out.extend_from_slice(body);
}

pub fn pat(tsid: u16, programs: &[(u16, u16)]) -> Vec<u8> {
    let mut payload = Vec::new();
    for (program, pid) in programs {
        payload.extend_from_slice(&program.to_be_bytes());
        payload.push(0xE0 | (pid >> 8) as u8);
        payload.push(*pid as u8);
    }
    long_section(0x00, tsid, 0, 0, 0, &payload)
}

/// PMT with `(stream_type, pid, descriptors)` entries.
pub fn pmt(program: u16, pcr_pid: u16, streams: &[(u8, u16, Vec<u8>)]) -> Vec<u8> {
    let mut payload = vec![0xE0 | (pcr_pid >> 8) as u8, pcr_pid as u8, 0xF0, 0x00];
    for (stream_type, pid, descriptors) in streams {
        payload.push(*stream_type);
        payload.push(0xE0 | (pid >> 8) as u8);
        payload.push(*pid as u8);
        length_prefixed(&mut payload, descriptors);
    }
    long_section(0x02, program, 0, 0, 0, &payload)
}

pub fn language_descriptor(code: &[u8; 3]) -> Vec<u8> {
    vec![0x0A, 0x04, code[0], code[1], code[2], 0x00]
}

/// Terrestrial delivery descriptor (8 MHz, QAM64, 2/3, 8k, 1/32) for `frequency` Hz.
pub fn terrestrial_descriptor(frequency: u32, other_frequency_flag: bool) -> Vec<u8> {
    let f = (frequency / 10).to_be_bytes();
    let last = 0x02 | u8::from(other_frequency_flag);
    vec![
        0x5A, 0x0B, f[0], f[1], f[2], f[3], 0x1F, 0x81, last, 0xFF, 0xFF, 0xFF, 0xFF,
    ]
}

/// Cable delivery descriptor (QAM64, 6900 kSym/s, auto FEC) for `frequency` Hz.
pub fn cable_descriptor(frequency: u32) -> Vec<u8> {
    // Frequency is 8 BCD digits in units of 100 Hz.
    let digits = format!("{:08}", frequency / 100);
    let b: Vec<u8> = digits
        .as_bytes()
        .chunks(2)
        .map(|p| ((p[0] - b'0') << 4) | (p[1] - b'0'))
        .collect();
    vec![
        0x44, 0x0B, b[0], b[1], b[2], b[3], 0xFF, 0xF0, 0x03, 0x00, 0x69, 0x00, 0x00,
    ]
}

pub fn frequency_list_descriptor(frequencies: &[u32]) -> Vec<u8> {
    let mut out = vec![0x62, (1 + frequencies.len() * 4) as u8, 0xFF];
    for f in frequencies {
        out.extend_from_slice(&(f / 10).to_be_bytes());
    }
    out
}

/// Logical channel descriptor with `(service_id, channel)` pairs, all visible.
pub fn lcn_descriptor(entries: &[(u16, u16)]) -> Vec<u8> {
    let mut out = vec![0x83, (entries.len() * 4) as u8];
    for (sid, lcn) in entries {
        out.extend_from_slice(&sid.to_be_bytes());
        out.push(0xFC | (lcn >> 8) as u8);
        out.push(*lcn as u8);
    }
    out
}

/// NIT with one network name and `(tsid, descriptors)` transport streams.
pub fn nit(table_id: u8, network_id: u16, name: &[u8], streams: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let mut network = vec![0x40, name.len() as u8];
    network.extend_from_slice(name);

    let mut ts_loop = Vec::new();
    for (tsid, descriptors) in streams {
        ts_loop.extend_from_slice(&tsid.to_be_bytes());
        ts_loop.extend_from_slice(&network_id.to_be_bytes());
        length_prefixed(&mut ts_loop, descriptors);
    }

    let mut payload = Vec::new();
    length_prefixed(&mut payload, &network);
    length_prefixed(&mut payload, &ts_loop);
    long_section(table_id, network_id, 0, 0, 0, &payload)
}

/// One SDT service entry carrying a digital television service descriptor.
pub fn sdt_service(
    service_id: u16,
    running: u8,
    scrambled: bool,
    provider: &[u8],
    name: &[u8],
) -> Vec<u8> {
    let mut descriptor = vec![0x48, (3 + provider.len() + name.len()) as u8, 0x01];
    descriptor.push(provider.len() as u8);
    descriptor.extend_from_slice(provider);
    descriptor.push(name.len() as u8);
    descriptor.extend_from_slice(name);

    let mut out = service_id.to_be_bytes().to_vec();
    let free_ca: u8 = if scrambled { 0x10 } else { 0 };
    out.push(0xFC);
    out.push((running << 5) | free_ca | (descriptor.len() >> 8) as u8);
    out.push(descriptor.len() as u8);
    out.extend_from_slice(&descriptor);
    out
}

pub fn sdt(tsid: u16, onid: u16, services: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = onid.to_be_bytes().to_vec();
    payload.push(0xFF);
    for s in services {
        payload.extend_from_slice(s);
    }
    long_section(0x42, tsid, 0, 0, 0, &payload)
}
