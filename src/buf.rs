use std::cmp;
use std::io::Read;

// Read until buf is full or the source hits EOF. Returns (eof, bytes_read).
pub fn fill_buf<R: Read>(data: &mut R, buf: &mut [u8]) -> std::io::Result<(bool, usize)> {
    let mut buf_read = 0;

    while buf_read < buf.len() {
        match data.read(&mut buf[buf_read..]) {
            Ok(0) => return Ok((true, buf_read)),
            Ok(x) => buf_read += x,
            Err(e) => return Err(e),
        };
    }
    Ok((false, buf_read))
}

// Move as much of in_buf as fits into buf, draining what was moved.
pub fn flush_buf(in_buf: &mut Vec<u8>, buf: &mut [u8]) -> usize {
    let split_at = cmp::min(in_buf.len(), buf.len());
    buf[..split_at].clone_from_slice(&in_buf[..split_at]);
    in_buf.drain(..split_at);

    split_at
}


#[cfg(test)]
mod test_flush_buf {
    use super::*;

    #[test]
    fn partial_drain() {
        let mut in_buf: Vec<u8> = vec![1, 2, 3, 4];
        let mut buf: [u8; 2] = [0; 2];

        assert_eq!(flush_buf(&mut in_buf, &mut buf), 2);
        assert_eq!(&buf, &[1, 2]);
        assert_eq!(&in_buf[..], &[3, 4]);
    }

    #[test]
    fn full_drain() {
        let mut in_buf: Vec<u8> = vec![1, 2];
        let mut buf: [u8; 4] = [0; 4];

        assert_eq!(flush_buf(&mut in_buf, &mut buf), 2);
        assert_eq!(&buf, &[1, 2, 0, 0]);
        assert!(in_buf.is_empty());
    }

    #[test]
    fn sequential_fills() {
        let mut in_buf1: Vec<u8> = vec![1, 2];
        let mut in_buf2: Vec<u8> = vec![3, 4];
        let mut buf: [u8; 4] = [0; 4];

        assert_eq!(flush_buf(&mut in_buf1, &mut buf), 2);
        assert_eq!(flush_buf(&mut in_buf2, &mut buf[2..]), 2);
        assert_eq!(&buf, &[1, 2, 3, 4]);
    }
}
