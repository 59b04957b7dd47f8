pub(crate) mod refill_ring;

pub(crate) use refill_ring::*;
