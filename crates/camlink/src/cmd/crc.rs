use std::io::Read;

use camlink_frame::crc16;

use crate::cmd::CrcArgs;
use crate::exit::{io_error, CliResult, SUCCESS};
use crate::output::{print_crc, OutputFormat};

pub fn run(args: CrcArgs, format: OutputFormat) -> CliResult<i32> {
    let input = read_input(&args)?;
    print_crc(crc16(&input), input.len(), format);
    Ok(SUCCESS)
}

fn read_input(args: &CrcArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return std::fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    let mut input = Vec::new();
    std::io::stdin()
        .read_to_end(&mut input)
        .map_err(|err| io_error("failed reading stdin", err))?;
    Ok(input)
}
