//! Native index encoding.
//!
//! # Layout
//! ```text
//! index     := fourcc header body
//! header    := d:i32 ntotal:i64 dummy:i64 dummy:i64 is_trained:u8 metric:i32
//!
//! "IxF2" / "IxFI"   flat L2 / flat inner product
//!   body    := xb:f32_vec
//!
//! "IwFl"            IVF-flat
//!   body    := nlist:u64 nprobe:u64 quantizer:index direct_map invlists
//!   direct_map := type:u8 ids:i64_vec           (always type 0, empty)
//!   invlists   := "ilar" nlist:u64 code_size:u64 "full" sizes:u64_vec
//!                 { codes:u8[size*code_size] ids:i64[size] }   per non-empty list
//!
//! f32_vec / u64_vec / i64_vec := count:u64 item*
//! ```
//! All integers are little-endian.

use super::flat::FlatIndex;
use super::io::*;
use super::ivf::{InvertedList, IvfFlatIndex};
use super::{MetricType, VectorIndex};

const FOURCC_FLAT_L2: &[u8; 4] = b"IxF2";
const FOURCC_FLAT_IP: &[u8; 4] = b"IxFI";
const FOURCC_IVF_FLAT: &[u8; 4] = b"IwFl";
const FOURCC_ARRAY_INVLISTS: &[u8; 4] = b"ilar";
const FOURCC_FULL_LISTS: &[u8; 4] = b"full";

/// Reserved header words, kept for layout compatibility.
const HEADER_DUMMY: i64 = 1 << 20;

struct Header {
    d: usize,
    ntotal: usize,
    is_trained: bool,
    metric: MetricType,
}

/// Serialize an index to `writer` in the native encoding.
pub fn write_index(index: &VectorIndex, writer: &mut dyn IoWriter) -> IndexResult<()> {
    match index {
        VectorIndex::Flat(flat) => write_flat(flat, writer),
        VectorIndex::IvfFlat(ivf) => write_ivf_flat(ivf, writer),
    }
}

/// Deserialize an index previously written by [`write_index`].
pub fn read_index(reader: &mut dyn IoReader) -> IndexResult<VectorIndex> {
    let tag = read_fourcc(reader)?;
    match &tag {
        FOURCC_FLAT_L2 | FOURCC_FLAT_IP => read_flat_body(reader, &tag).map(VectorIndex::Flat),
        FOURCC_IVF_FLAT => read_ivf_flat_body(reader).map(VectorIndex::IvfFlat),
        _ => Err(IndexError::UnknownFourcc(tag)),
    }
}

fn write_header(w: &mut dyn IoWriter, header: &Header) -> IndexResult<()> {
    write_i32(w, header.d as i32)?;
    write_i64(w, header.ntotal as i64)?;
    write_i64(w, HEADER_DUMMY)?;
    write_i64(w, HEADER_DUMMY)?;
    write_u8(w, header.is_trained as u8)?;
    write_i32(w, header.metric as i32)
}

fn read_header(r: &mut dyn IoReader) -> IndexResult<Header> {
    let d = read_i32(r)?;
    let ntotal = read_i64(r)?;
    let _ = read_i64(r)?;
    let _ = read_i64(r)?;
    let is_trained = read_u8(r)? != 0;
    let metric_code = read_i32(r)?;

    if d <= 0 {
        return Err(IndexError::Corrupt(format!("invalid dimension {}", d)));
    }
    if ntotal < 0 {
        return Err(IndexError::Corrupt(format!("invalid ntotal {}", ntotal)));
    }
    let metric = MetricType::from_i32(metric_code)
        .ok_or_else(|| IndexError::Corrupt(format!("unknown metric {}", metric_code)))?;

    Ok(Header {
        d: d as usize,
        ntotal: ntotal as usize,
        is_trained,
        metric,
    })
}

fn write_flat(index: &FlatIndex, w: &mut dyn IoWriter) -> IndexResult<()> {
    let tag = match index.metric() {
        MetricType::L2 => FOURCC_FLAT_L2,
        MetricType::InnerProduct => FOURCC_FLAT_IP,
    };
    write_fourcc(w, tag)?;
    write_header(
        w,
        &Header {
            d: index.dimension(),
            ntotal: index.ntotal(),
            is_trained: true,
            metric: index.metric(),
        },
    )?;
    write_f32_vec(w, index.vectors())
}

fn read_flat_body(r: &mut dyn IoReader, tag: &[u8; 4]) -> IndexResult<FlatIndex> {
    let header = read_header(r)?;
    let expected_metric = if tag == FOURCC_FLAT_L2 {
        MetricType::L2
    } else {
        MetricType::InnerProduct
    };
    if header.metric != expected_metric {
        return Err(IndexError::Corrupt(format!(
            "flat index tag {:?} carries metric {:?}",
            tag, header.metric
        )));
    }

    let expected = header.ntotal.checked_mul(header.d).ok_or_else(|| {
        IndexError::Corrupt(format!(
            "{} vectors of dimension {} overflow the address space",
            header.ntotal, header.d
        ))
    })?;
    let xb = read_f32_vec(r)?;
    if xb.len() != expected {
        return Err(IndexError::Corrupt(format!(
            "expected {} floats, found {}",
            expected,
            xb.len()
        )));
    }
    FlatIndex::from_parts(header.d, header.metric, xb)
}

fn write_ivf_flat(index: &IvfFlatIndex, w: &mut dyn IoWriter) -> IndexResult<()> {
    write_fourcc(w, FOURCC_IVF_FLAT)?;
    write_header(
        w,
        &Header {
            d: index.dimension(),
            ntotal: index.ntotal(),
            is_trained: index.is_trained(),
            metric: index.metric(),
        },
    )?;
    write_u64(w, index.nlist() as u64)?;
    write_u64(w, index.nprobe() as u64)?;
    write_flat(index.quantizer(), w)?;

    // direct map: none
    write_u8(w, 0)?;
    write_u64(w, 0)?;

    let code_size = index.dimension() * 4;
    write_fourcc(w, FOURCC_ARRAY_INVLISTS)?;
    write_u64(w, index.nlist() as u64)?;
    write_u64(w, code_size as u64)?;
    write_fourcc(w, FOURCC_FULL_LISTS)?;
    let sizes: Vec<u64> = index.lists().iter().map(|l| l.ids.len() as u64).collect();
    write_u64_vec(w, &sizes)?;
    for list in index.lists().iter().filter(|l| !l.ids.is_empty()) {
        write_f32s(w, &list.codes)?;
        write_i64s(w, &list.ids)?;
    }
    Ok(())
}

fn read_ivf_flat_body(r: &mut dyn IoReader) -> IndexResult<IvfFlatIndex> {
    let header = read_header(r)?;
    let nlist = read_u64(r)? as usize;
    let nprobe = read_u64(r)? as usize;

    let quantizer = match read_index(r)? {
        VectorIndex::Flat(flat) => flat,
        VectorIndex::IvfFlat(_) => {
            return Err(IndexError::Corrupt("nested IVF quantizer".into()));
        }
    };
    if quantizer.dimension() != header.d {
        return Err(IndexError::Corrupt(format!(
            "quantizer dimension {} does not match index dimension {}",
            quantizer.dimension(),
            header.d
        )));
    }
    if !header.is_trained {
        return Err(IndexError::Corrupt("untrained IVF index in stream".into()));
    }

    let map_type = read_u8(r)?;
    let map_len = read_u64(r)?;
    if map_type != 0 || map_len != 0 {
        return Err(IndexError::Corrupt("unsupported direct map".into()));
    }

    let tag = read_fourcc(r)?;
    if &tag != FOURCC_ARRAY_INVLISTS {
        return Err(IndexError::UnknownFourcc(tag));
    }
    let lists_n = read_u64(r)? as usize;
    let code_size = read_u64(r)? as usize;
    if lists_n != nlist || header.d.checked_mul(4) != Some(code_size) {
        return Err(IndexError::Corrupt(format!(
            "inverted lists ({} lists, code size {}) do not match index",
            lists_n, code_size
        )));
    }
    let tag = read_fourcc(r)?;
    if &tag != FOURCC_FULL_LISTS {
        return Err(IndexError::UnknownFourcc(tag));
    }
    let sizes = read_u64_vec(r)?;
    if sizes.len() != nlist {
        return Err(IndexError::Corrupt("inverted list count mismatch".into()));
    }

    let mut lists = Vec::with_capacity(nlist);
    for &size in &sizes {
        let mut list = InvertedList::default();
        if size > 0 {
            list.codes = read_f32s(r, size.saturating_mul(header.d as u64))?;
            list.ids = read_i64s(r, size)?;
        }
        lists.push(list);
    }

    let index = IvfFlatIndex::from_parts(header.metric, nprobe, quantizer, lists)?;
    if index.ntotal() != header.ntotal {
        return Err(IndexError::Corrupt(format!(
            "header ntotal {} but lists hold {}",
            header.ntotal,
            index.ntotal()
        )));
    }
    Ok(index)
}
