//! Credit ledger — per-port downstream buffer accounting.
//!
//! A packet may only leave a port when the remote buffer has room for it.
//! Sending consumes credit, credit-return messages replenish it. Available
//! credit stays within `[0, capacity]`; leaving that range is fatal.

use snappr_core::Port;

use crate::error::NicError;

#[derive(Debug, Clone)]
struct CreditPool {
    /// `None` = unlimited.
    capacity: Option<u64>,
    /// Bytes sent and not yet returned.
    outstanding: u64,
}

impl CreditPool {
    fn available(&self) -> Option<u64> {
        self.capacity.map(|cap| cap - self.outstanding)
    }
}

#[derive(Debug, Clone)]
pub struct CreditLedger {
    pools: Vec<CreditPool>,
}

impl CreditLedger {
    /// `capacity` bytes of credit on each of `num_ports` ports.
    pub fn new(num_ports: u16, capacity: Option<u64>) -> Self {
        Self {
            pools: (0..num_ports)
                .map(|_| CreditPool {
                    capacity,
                    outstanding: 0,
                })
                .collect(),
        }
    }

    pub fn unlimited(num_ports: u16) -> Self {
        Self::new(num_ports, None)
    }

    pub fn num_ports(&self) -> u16 {
        self.pools.len() as u16
    }

    fn pool(&self, port: Port) -> Result<&CreditPool, NicError> {
        self.pools.get(port.index()).ok_or(NicError::UnknownPort {
            port,
            num_ports: self.num_ports(),
        })
    }

    fn pool_mut(&mut self, port: Port) -> Result<&mut CreditPool, NicError> {
        let num_ports = self.num_ports();
        self.pools
            .get_mut(port.index())
            .ok_or(NicError::UnknownPort { port, num_ports })
    }

    /// Whether `bytes` may be sent on `port` right now.
    pub fn has_credit(&self, port: Port, bytes: u64) -> bool {
        match self.pool(port) {
            Ok(pool) => pool.available().map_or(true, |avail| avail >= bytes),
            Err(_) => false,
        }
    }

    /// Spend credit for a packet. Only call after `has_credit` held.
    pub fn consume(&mut self, port: Port, bytes: u64) -> Result<(), NicError> {
        let pool = self.pool_mut(port)?;
        if let Some(available) = pool.available() {
            if available < bytes {
                return Err(NicError::CreditUnderflow {
                    port,
                    requested: bytes,
                    available,
                });
            }
        }
        pool.outstanding += bytes;
        Ok(())
    }

    /// Return previously consumed credit.
    pub fn replenish(&mut self, port: Port, bytes: u64) -> Result<(), NicError> {
        let pool = self.pool_mut(port)?;
        if bytes > pool.outstanding {
            return Err(NicError::CreditOverflow {
                port,
                returned: bytes,
                outstanding: pool.outstanding,
            });
        }
        pool.outstanding -= bytes;
        Ok(())
    }

    /// Credit left on `port`, `None` when unlimited or out of range.
    pub fn available(&self, port: Port) -> Option<u64> {
        self.pool(port).ok().and_then(CreditPool::available)
    }

    /// Bytes consumed on `port` and not yet returned.
    pub fn consumed(&self, port: Port) -> u64 {
        self.pool(port).map_or(0, |pool| pool.outstanding)
    }

    pub fn capacity(&self, port: Port) -> Option<u64> {
        self.pool(port).ok().and_then(|pool| pool.capacity)
    }
}
