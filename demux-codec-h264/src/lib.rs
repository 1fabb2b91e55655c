//! H.264 (Annex-B and AVCC) packet parsing: NAL unit iteration, SPS-derived picture geometry, and
//! slice-header-derived frame typing, plus an AVCC-to-Annex-B bitstream filter for `ReadRaw`
//! consumers. Grounded on `lib/h264_header.c` and `lib/parse_h264.c`'s NAL/SPS parsing and on the
//! general H.264 (ITU-T Rec. H.264) bitstream syntax those files implement.

pub mod filter;
pub mod nal;
pub mod parser;
pub mod slice;
pub mod sps;

pub use filter::AvccToAnnexBFilter;
pub use parser::{H264Parser, NalSyntax};
