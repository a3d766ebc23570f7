use clap;
use crate::rec::RecordFile;
use crate::STDRESULT;

/// Re-express the input in the output format.  An optional range crops the
/// image on the way through.
pub fn convert(cmd: &clap::ArgMatches) -> STDRESULT {
    let mut file = super::load_input(cmd)?;
    match (super::get_addr(cmd,"start")?,super::get_addr(cmd,"end")?) {
        (Some(s),Some(e)) => file.crop(s,e)?,
        (None,None) => {},
        _ => {
            log::error!("give both ends of the range to crop while converting");
            return Err(Box::new(super::CommandError::InvalidCommand));
        }
    }
    super::finish(cmd,file)
}
