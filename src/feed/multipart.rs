use bytes::{BufMut, Bytes, BytesMut};
use futures::{Stream, StreamExt};

pub const BOUNDARY: &str = "frame";

/// `Content-Type` of a response carrying [`part`]s
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";

/// Wrap one JPEG as a `multipart/x-mixed-replace` part
pub fn part(jpeg: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(PART_HEADER.len() + jpeg.len() + 2);
    buf.put_slice(PART_HEADER);
    buf.put_slice(jpeg);
    buf.put_slice(b"\r\n");
    buf.freeze()
}

/// Map a stream of encoded frames to multipart parts
pub fn into_parts<S>(frames: S) -> impl Stream<Item = Bytes>
where
    S: Stream<Item = Bytes>,
{
    frames.map(|jpeg| part(&jpeg))
}
