/// A simple flat memory storage
pub struct LinearMemory {
    pub data: Vec<u8>,
    pub base_addr: u64,
}

impl std::fmt::Debug for LinearMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinearMemory")
            .field("base_addr", &format_args!("{:#x}", self.base_addr))
            .field("size", &self.data.len())
            .finish()
    }
}

impl LinearMemory {
    pub fn new(size: usize, base_addr: u64) -> Self {
        Self {
            data: vec![0; size],
            base_addr,
        }
    }

    fn index(&self, addr: u64) -> Option<usize> {
        addr.checked_sub(self.base_addr)
            .filter(|&off| off < self.data.len() as u64)
            .map(|off| off as usize)
    }

    pub fn end_addr(&self) -> u64 {
        self.base_addr + self.data.len() as u64
    }

    pub fn read_u8(&self, addr: u64) -> Option<u8> {
        self.index(addr).map(|i| self.data[i])
    }

    pub fn write_u8(&mut self, addr: u64, value: u8) -> bool {
        match self.index(addr) {
            Some(i) => {
                self.data[i] = value;
                true
            }
            None => false,
        }
    }
}
