
use log::{info, error};

use structopt::StructOpt;

use linux_embedded_hal::{Delay, I2cdev};

use simplelog::{TermLogger, LevelFilter, TerminalMode};

use ihex::{Record, Reader};

use i2c_eeprom::prelude::*;
use i2c_eeprom::series24::{Eeprom, Geometry, Presence};

#[derive(Debug, PartialEq, StructOpt)]
struct Options {
    #[structopt(subcommand)]
    operation: Operations,

    /// I2C bus device
    #[structopt(long, default_value = "/dev/i2c-1", env = "I2C_DEV")]
    i2c_dev: String,

    /// EEPROM device address in hex (strap range 50-57)
    #[structopt(long, default_value = "50", parse(try_from_str = parse_hex_u8))]
    address: u8,

    /// Device page size in bytes
    #[structopt(long, default_value = "32")]
    page_size: u16,

    /// Bus transaction buffer size in bytes
    #[structopt(long, default_value = "32")]
    buffer_size: u16,

    /// Configure log level
    #[structopt(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: LevelFilter,
}

#[derive(Debug, PartialEq, StructOpt)]
pub enum Operations {
    /// Check that the device responds on the bus
    Probe,
    /// Read data from the device
    Read {
        /// EEPROM address for read start in hex
        #[structopt(parse(try_from_str = parse_hex))]
        address: u16,
        /// Length of the read in bytes
        #[structopt()]
        length: u32,
    },
    /// Write data to the device, skipping unchanged pages
    Write {
        /// EEPROM address for write start in hex
        #[structopt(parse(try_from_str = parse_hex))]
        address: u16,

        // Data to write in hexadecimal
        #[structopt(long)]
        data: HexData,
    },
    /// Read a single byte
    ReadByte {
        /// EEPROM address in hex
        #[structopt(parse(try_from_str = parse_hex))]
        address: u16,
    },
    /// Write a single byte
    WriteByte {
        /// EEPROM address in hex
        #[structopt(parse(try_from_str = parse_hex))]
        address: u16,

        /// Byte value in hex
        #[structopt(parse(try_from_str = parse_hex_u8))]
        value: u8,
    },
    /// Dump EEPROM contents into a hex file
    Dump {
        /// EEPROM address for read start in hex
        #[structopt(parse(try_from_str = parse_hex))]
        address: u16,

        /// Length of the read in bytes
        #[structopt()]
        length: u32,

        /// Output ihex file
        #[structopt(long, default_value = "dump.ihex")]
        file: String,
    },
    /// Load EEPROM contents from a hex file
    Load {
        /// Input ihex file
        file: String,
    },
}

#[derive(Debug, PartialEq)]
pub struct HexData(Vec<u8>);

impl std::str::FromStr for HexData {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex::decode(s).map(HexData)
    }
}

fn parse_hex(s: &str) -> Result<u16, std::num::ParseIntError> {
    u16::from_str_radix(s, 16)
}

fn parse_hex_u8(s: &str) -> Result<u8, std::num::ParseIntError> {
    u8::from_str_radix(s, 16)
}

fn main() -> Result<(), Box<dyn std::error::Error + 'static>> {
    // Load options
    let opts = Options::from_args();

    // Setup logging
    TermLogger::init(opts.log_level, simplelog::Config::default(), TerminalMode::Mixed).unwrap();

    // Connect to the I2C bus
    let i2c = I2cdev::new(&opts.i2c_dev).unwrap();

    // Instantiate the EEPROM driver
    let geometry = Geometry {
        page_size: opts.page_size,
        buffer_size: opts.buffer_size,
    };
    let mut eeprom = Eeprom::new(i2c, Delay, opts.address, geometry);

    // Check the device responds before doing anything with it
    match eeprom.init() {
        Presence::Found => info!("EEPROM responding at 0x{:02x}", opts.address),
        presence => {
            error!("EEPROM not responding at 0x{:02x} ({:?})", opts.address, presence);
            return Ok(());
        }
    }

    // Perform the requested operation
    match &opts.operation {
        Operations::Probe => (),
        Operations::Read { address, length } => {
            info!("Reading {} bytes from address 0x{:04x}", length, address);

            let mut buff = vec![0u8; *length as usize];
            eeprom.read(*address, &mut buff).unwrap();

            info!("Read: {:02x?}", buff);
        }
        Operations::Write { address, data } => {
            info!("Writing {} bytes to address 0x{:04x}", data.0.len(), address);

            eeprom.write(*address, &data.0).unwrap();

            info!("Write complete");
        }
        Operations::ReadByte { address } => {
            let value = eeprom.read_byte(*address).unwrap();

            info!("Read 0x{:02x} from address 0x{:04x}", value, address);
        }
        Operations::WriteByte { address, value } => {
            eeprom.write_byte_if_changed(*address, *value).unwrap();

            info!("Wrote 0x{:02x} to address 0x{:04x}", value, address);
        }
        Operations::Dump { address, length, file } => {
            info!("Reading {} bytes from address 0x{:04x} to file {}", length, address, &file);

            let mut buff = vec![0u8; *length as usize];
            eeprom.read(*address, &mut buff).unwrap();

            let mut records = Vec::new();
            for (c, chunk) in buff.chunks(32).enumerate() {
                records.push(Record::Data {
                    offset: address.wrapping_add((c * 32) as u16),
                    value: chunk.to_vec(),
                });
            }
            records.push(Record::EndOfFile);

            let data = ihex::create_object_file_representation(&records).unwrap();

            std::fs::write(file, data).unwrap();

            info!("Dump complete");
        }
        Operations::Load { file } => {
            info!("Loading file {}", file);

            let data = String::from_utf8(std::fs::read(&file).unwrap()).unwrap();

            let reader = Reader::new(&data);

            for record in reader {
                match record {
                    Ok(Record::Data { offset, value }) => {
                        info!("Writing {} bytes at address 0x{:04x}", value.len(), offset);
                        eeprom.write(offset, &value).unwrap();
                    }
                    Ok(Record::EndOfFile) => (),
                    Err(e) => {
                        error!("Reader error: {:?}", e);
                        return Ok(());
                    }
                    _ => {
                        error!("Unrecognised record: {:?}", record);
                        return Ok(());
                    }
                }
            }

            info!("Load complete");
        }
    }

    Ok(())
}
